//! Shared harness for cluster integration tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use replog::{
    Cluster, Commit, Member, MemberKind, MemoryLogStore, MemoryNetwork, NodeId, Replica,
    ReplicaConfig, ReplicaStatus, RoleKind,
};

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Shared key-value state machine backing each replica's commit handler.
/// Non-empty payloads are puts, empty payloads are tombstones, queries
/// return the stored value.
pub type KvStore = Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>;

pub fn kv_handler(store: KvStore) -> impl FnMut(Commit<'_>) -> Vec<u8> + Send + 'static {
    move |commit| match commit {
        Commit::Apply { key, entry, .. } => {
            let mut kv = store.lock().unwrap();
            if entry.is_empty() {
                kv.remove(key);
                Vec::new()
            } else {
                kv.insert(key.to_vec(), entry.to_vec());
                entry.to_vec()
            }
        }
        Commit::Query { key, .. } => {
            store.lock().unwrap().get(key).cloned().unwrap_or_default()
        }
    }
}

pub struct TestCluster {
    pub network: MemoryNetwork,
    pub replicas: Vec<Replica>,
    pub ids: Vec<NodeId>,
    pub stores: Vec<KvStore>,
}

impl TestCluster {
    /// Builds and opens `n` active replicas wired through a memory
    /// network, with fast timeouts suitable for tests.
    pub async fn start(n: usize) -> Self {
        Self::start_with_config(n, test_config()).await
    }

    pub async fn start_with_config(n: usize, config: ReplicaConfig) -> Self {
        init_tracing();
        let ids: Vec<NodeId> = (1..=n as u64).collect();
        let members: Vec<Member> = ids
            .iter()
            .map(|&id| Member::new(id, MemberKind::Active))
            .collect();
        let network = MemoryNetwork::new();

        let mut replicas = Vec::new();
        let mut stores = Vec::new();
        for &id in &ids {
            let cluster = Cluster::new(id, members.clone(), n).unwrap();
            let store: KvStore = Arc::new(Mutex::new(HashMap::new()));
            let replica = Replica::builder()
                .with_cluster(cluster)
                .with_config(config.clone())
                .with_storage(MemoryLogStore::new())
                .with_transport(network.transport(id))
                .with_commit_handler(kv_handler(Arc::clone(&store)))
                .build()
                .unwrap();
            network.register(id, replica.handle());
            replicas.push(replica);
            stores.push(store);
        }
        for replica in &replicas {
            replica.open().await.unwrap();
        }
        TestCluster {
            network,
            replicas,
            ids,
            stores,
        }
    }

    pub fn replica(&self, id: NodeId) -> &Replica {
        let position = self.ids.iter().position(|&i| i == id).unwrap();
        &self.replicas[position]
    }

    /// Polls until some replica reports itself leader, returning its id.
    pub async fn wait_for_leader(&self, timeout: Duration) -> NodeId {
        self.wait_for_leader_among(&self.ids, timeout).await
    }

    /// Polls the given replicas until one reports itself leader.
    pub async fn wait_for_leader_among(&self, ids: &[NodeId], timeout: Duration) -> NodeId {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            for &id in ids {
                let status = self.replica(id).status().await.unwrap();
                if status.role == RoleKind::Leader && status.leader == Some(id) {
                    return id;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("no leader elected within {:?}", timeout);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Polls until `predicate` holds for the status of replica `id`.
    pub async fn wait_for_status(
        &self,
        id: NodeId,
        timeout: Duration,
        predicate: impl Fn(&ReplicaStatus) -> bool,
    ) -> ReplicaStatus {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.replica(id).status().await.unwrap();
            if predicate(&status) {
                return status;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!(
                    "condition not reached within {:?}; last status: {:?}",
                    timeout, status
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub fn test_config() -> ReplicaConfig {
    ReplicaConfig::new(Duration::from_millis(150), Duration::from_millis(30))
}

/// Configuration with an election timeout long enough that tests driving
/// a replica through direct RPCs never race a self-started election.
pub fn manual_config() -> ReplicaConfig {
    ReplicaConfig::new(Duration::from_secs(10), Duration::from_millis(50))
}
