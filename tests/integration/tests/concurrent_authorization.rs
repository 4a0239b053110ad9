use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use pkgate_authorizer::{
    action, Action, Authority, AuthorityError, AuthoritySubject, AuthorityVerdict, Authorizer,
    AuthorizerConfig, CheckFlags, CheckRequest, DenialKind, PeerCredentials, StaticUserLookup,
};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Authority fake answering per pid, recording every subject it sees.
struct PidPolicyAuthority {
    allowed_pids: Vec<u32>,
    latency: Duration,
    seen: AsyncMutex<Vec<(AuthoritySubject, String)>>,
    cancelled: AsyncMutex<Vec<String>>,
}

impl PidPolicyAuthority {
    fn new(allowed_pids: Vec<u32>, latency: Duration) -> Self {
        Self {
            allowed_pids,
            latency,
            seen: AsyncMutex::new(Vec::new()),
            cancelled: AsyncMutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Authority for PidPolicyAuthority {
    async fn check_authorization(
        &self,
        subject: &AuthoritySubject,
        action_id: &str,
        flags: CheckFlags,
        _cancellation_id: &str,
    ) -> Result<AuthorityVerdict, AuthorityError> {
        assert!(flags.allows_interaction());
        tokio::time::sleep(self.latency).await;
        self.seen
            .lock()
            .await
            .push((*subject, action_id.to_string()));
        if self.allowed_pids.contains(&subject.details.pid) {
            Ok(AuthorityVerdict::allowed())
        } else {
            Ok(AuthorityVerdict::denied())
        }
    }

    async fn cancel_check_authorization(&self, cancellation_id: &str) -> Result<(), AuthorityError> {
        self.cancelled.lock().await.push(cancellation_id.to_string());
        Ok(())
    }
}

/// Temporary filesystem root with a fake `/proc` tree.
struct FakeProcRoot {
    root: PathBuf,
}

impl FakeProcRoot {
    fn new(label: &str) -> Self {
        let tick = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let count = WORKSPACE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "pkgate-{label}-{}-{tick}-{count}",
            std::process::id()
        ));
        fs::create_dir_all(&root).expect("must create fake proc root");
        Self { root }
    }

    fn with_process(self, pid: i32, comm: &str, start_time: u64) -> Self {
        let dir = self.root.join("proc").join(pid.to_string());
        fs::create_dir_all(&dir).expect("must create fake proc entry");
        fs::write(
            dir.join("stat"),
            format!(
                "{pid} ({comm}) S 1 {pid} {pid} 0 -1 4194304 210 0 0 0 0 0 0 0 20 0 1 0 {start_time} 5562368 420 18446744073709551615\n"
            ),
        )
        .expect("must write fake stat record");
        self
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for FakeProcRoot {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

fn build_gate(root: &Path, authority: Arc<PidPolicyAuthority>) -> Arc<Authorizer> {
    let users = StaticUserLookup::new()
        .with_user("alice", 1000)
        .with_user("bob", 1001);
    Arc::new(Authorizer::new(
        AuthorizerConfig::new(authority)
            .with_proc_root(root)
            .with_user_lookup(Arc::new(users)),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn integration_concurrent_checks_keep_independent_outcomes() {
    init_tracing();
    let proc_root = FakeProcRoot::new("concurrent")
        .with_process(101, "denied client", 5_000)
        .with_process(202, "allowed (client)", 6_000);
    let authority = Arc::new(PidPolicyAuthority::new(
        vec![202],
        Duration::from_millis(20),
    ));
    let gate = build_gate(proc_root.root(), authority.clone());

    let mut handles = Vec::new();
    for round in 0..8 {
        for (pid, uid) in [(101, 1000), (202, 1001), (303, 0)] {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                let request = CheckRequest::new(PeerCredentials { pid, uid });
                let outcome = gate
                    .check_from_request(&request, &action::SERVICE_MANAGE)
                    .await;
                (round, pid, outcome.map_err(|error| error.kind()))
            }));
        }
    }

    for handle in handles {
        let (round, pid, outcome) = handle.await.expect("check task");
        match pid {
            101 => assert_eq!(
                outcome,
                Err(DenialKind::PermissionDenied),
                "round {round}"
            ),
            202 | 303 => assert_eq!(outcome, Ok(()), "round {round} pid {pid}"),
            other => panic!("unexpected pid {other}"),
        }
    }

    let seen = authority.seen.lock().await;
    assert_eq!(seen.len(), 16, "uid 0 checks never reach the authority");
    let start_times = seen
        .iter()
        .map(|(subject, _)| (subject.details.pid, subject.details.start_time))
        .collect::<BTreeMap<_, _>>();
    assert_eq!(start_times, BTreeMap::from([(101, 5_000), (202, 6_000)]));
    assert!(seen
        .iter()
        .all(|(_, action_id)| action_id == "org.pkgate.service.manage"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn integration_self_other_resolution_is_per_request() {
    init_tracing();
    let proc_root = FakeProcRoot::new("self-other").with_process(404, "pkgate-cli", 42);
    let authority = Arc::new(PidPolicyAuthority::new(vec![404], Duration::ZERO));
    let gate = build_gate(proc_root.root(), authority.clone());

    let self_check = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            let request =
                CheckRequest::new(PeerCredentials { pid: 404, uid: 1000 }).on_user("alice");
            gate.check_from_request(&request, &action::POLICY_UPDATE).await
        })
    };
    let other_check = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            let request =
                CheckRequest::new(PeerCredentials { pid: 404, uid: 1000 }).on_user("bob");
            gate.check_from_request(&request, &action::POLICY_UPDATE).await
        })
    };
    self_check.await.expect("task").expect("self update allowed");
    other_check.await.expect("task").expect("other update allowed");

    let mut ids = authority
        .seen
        .lock()
        .await
        .iter()
        .map(|(_, action_id)| action_id.clone())
        .collect::<Vec<_>>();
    ids.sort();
    assert_eq!(
        ids,
        vec![
            "org.pkgate.policy.update-others".to_string(),
            "org.pkgate.policy.update-self".to_string(),
        ]
    );
}

#[tokio::test]
async fn regression_recycled_pid_is_reported_with_new_start_time() {
    init_tracing();
    let proc_root = FakeProcRoot::new("pid-reuse").with_process(505, "first", 100);
    let authority = Arc::new(PidPolicyAuthority::new(vec![505], Duration::ZERO));
    let gate = build_gate(proc_root.root(), authority.clone());
    let request = CheckRequest::new(PeerCredentials { pid: 505, uid: 1000 });
    let manage = Action::plain("org.pkgate.service.manage");

    gate.check_from_request(&request, &manage)
        .await
        .expect("first lifetime");
    let proc_root = proc_root.with_process(505, "second", 900);
    gate.check_from_request(&request, &manage)
        .await
        .expect("second lifetime");

    let start_times = authority
        .seen
        .lock()
        .await
        .iter()
        .map(|(subject, _)| subject.details.start_time)
        .collect::<Vec<_>>();
    assert_eq!(start_times, vec![100, 900]);
    drop(proc_root);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn integration_cancelled_request_leaves_sibling_checks_untouched() {
    init_tracing();
    let proc_root = FakeProcRoot::new("cancel")
        .with_process(606, "impatient", 11)
        .with_process(707, "patient", 22);
    let authority = Arc::new(PidPolicyAuthority::new(
        vec![606, 707],
        Duration::from_millis(400),
    ));
    let gate = build_gate(proc_root.root(), authority.clone());
    let token = CancellationToken::new();

    let impatient = {
        let gate = Arc::clone(&gate);
        let token = token.clone();
        tokio::spawn(async move {
            let request =
                CheckRequest::new(PeerCredentials { pid: 606, uid: 1000 }).with_cancellation(token);
            gate.check_from_request(&request, &action::SERVICE_MANAGE).await
        })
    };
    let patient = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move {
            let request = CheckRequest::new(PeerCredentials { pid: 707, uid: 1001 })
                .with_cancellation(CancellationToken::new());
            gate.check_from_request(&request, &action::SERVICE_MANAGE).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let cancelled = impatient.await.expect("task").expect_err("cancelled");
    assert_eq!(cancelled.kind(), DenialKind::Cancelled);
    patient.await.expect("task").expect("sibling allowed");

    let cancelled_ids = authority.cancelled.lock().await.clone();
    assert_eq!(cancelled_ids.len(), 1);
    assert!(cancelled_ids[0].starts_with("pkgate-"), "{cancelled_ids:?}");
}
