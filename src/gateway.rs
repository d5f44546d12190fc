//! Client gateway
//!
//! Packages client operations as requests, submits them to the context
//! thread, and unwraps the results. Requests against a closed replica
//! fail synchronously with `NotOpen`; everything else is resolved by the
//! pump through the current role.

use crate::error::{ReplicaError, Result};
use crate::replica::ReplicaHandle;
use crate::rpc::{ClientRequest, Consistency, DeleteRequest, ReadRequest, WriteRequest};

pub(crate) struct Gateway {
    handle: ReplicaHandle,
}

impl Gateway {
    pub(crate) fn new(handle: ReplicaHandle) -> Self {
        Self { handle }
    }

    pub(crate) async fn read(
        &self,
        key: Vec<u8>,
        entry: Vec<u8>,
        consistency: Consistency,
    ) -> Result<Vec<u8>> {
        self.submit(ClientRequest::Read(ReadRequest {
            key,
            entry,
            consistency,
        }))
        .await
    }

    pub(crate) async fn write(
        &self,
        key: Vec<u8>,
        entry: Vec<u8>,
        _consistency: Consistency,
    ) -> Result<Vec<u8>> {
        // Writes are linearised through the log regardless of the
        // requested level.
        self.submit(ClientRequest::Write(WriteRequest { key, entry })).await
    }

    pub(crate) async fn delete(
        &self,
        key: Vec<u8>,
        _consistency: Consistency,
    ) -> Result<Vec<u8>> {
        self.submit(ClientRequest::Delete(DeleteRequest { key })).await
    }

    async fn submit(&self, request: ClientRequest) -> Result<Vec<u8>> {
        if !self.handle.is_open() {
            return Err(ReplicaError::NotOpen);
        }
        self.handle.client(request).await
    }
}
