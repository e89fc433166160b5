#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::bail;
use async_trait::async_trait;
use interviewlab::{
    auth::Clients,
    config::IdpConfig,
    db,
    execute::PistonClient,
    models::User,
    stream::{CallMetadata, ChatDirectory, ChatUser, Provisioner},
    sync::{IdentityEvent, SyncQueue},
    users::{self, NewUser},
    AppState, SessionService,
};
use sqlx::SqlitePool;
use tokio::sync::mpsc;

pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Records every platform call; failures can be switched on per concern.
#[derive(Default)]
pub struct FakePlatform {
    log: Mutex<Vec<String>>,
    pub fail_provisioning: AtomicBool,
    pub fail_membership: AtomicBool,
    pub fail_teardown: AtomicBool,
    pub hang_provisioning: AtomicBool,
    pub hang_teardown: AtomicBool,
}

impl FakePlatform {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.log().iter().filter(|entry| entry.starts_with(prefix)).count()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    /// Never answers while `flag` is set.
    async fn stall(&self, flag: &AtomicBool) {
        if flag.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> anyhow::Result<()> {
        if flag.load(Ordering::SeqCst) {
            bail!("{what} unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Provisioner for FakePlatform {
    async fn create_call(&self, call_id: &str, metadata: &CallMetadata) -> anyhow::Result<()> {
        self.stall(&self.hang_provisioning).await;
        self.check(&self.fail_provisioning, "video")?;
        self.record(format!(
            "create_call {call_id} {} {} {}",
            metadata.problem, metadata.difficulty, metadata.session_id
        ));
        Ok(())
    }

    async fn create_channel(&self, call_id: &str, _metadata: &CallMetadata, members: &[String]) -> anyhow::Result<()> {
        self.check(&self.fail_provisioning, "chat")?;
        self.record(format!("create_channel {call_id} {}", members.join(",")));
        Ok(())
    }

    async fn add_member(&self, call_id: &str, user_id: &str) -> anyhow::Result<()> {
        self.check(&self.fail_membership, "chat")?;
        self.record(format!("add_member {call_id} {user_id}"));
        Ok(())
    }

    async fn delete_call(&self, call_id: &str) -> anyhow::Result<()> {
        self.stall(&self.hang_teardown).await;
        self.check(&self.fail_teardown, "video")?;
        self.record(format!("delete_call {call_id}"));
        Ok(())
    }

    async fn delete_channel(&self, call_id: &str) -> anyhow::Result<()> {
        self.check(&self.fail_teardown, "chat")?;
        self.record(format!("delete_channel {call_id}"));
        Ok(())
    }
}

#[async_trait]
impl ChatDirectory for FakePlatform {
    async fn upsert_user(&self, user: &ChatUser) -> anyhow::Result<()> {
        self.record(format!("upsert_user {}", user.id));
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> anyhow::Result<()> {
        self.record(format!("delete_user {user_id}"));
        Ok(())
    }

    fn user_token(&self, user_id: &str) -> anyhow::Result<String> {
        Ok(format!("token-for-{user_id}"))
    }
}

pub struct Harness {
    pub db_pool: SqlitePool,
    pub platform: Arc<FakePlatform>,
    pub sessions: SessionService,
}

pub async fn harness() -> Harness {
    harness_with_timeout(Duration::from_secs(2)).await
}

pub async fn harness_with_timeout(adapter_timeout: Duration) -> Harness {
    let db_pool = db::connect_in_memory().await.unwrap();
    let platform = Arc::new(FakePlatform::default());
    let sessions = SessionService::new(db_pool.clone(), platform.clone(), adapter_timeout);

    Harness {
        db_pool,
        platform,
        sessions,
    }
}

impl Harness {
    pub async fn user(&self, handle: &str) -> User {
        users::upsert(
            &self.db_pool,
            &NewUser {
                external_id: format!("ext_{handle}"),
                email: format!("{handle}@example.com"),
                name: handle.to_owned(),
                avatar: None,
            },
        )
        .await
        .unwrap()
    }

    pub fn state(&self) -> (AppState, mpsc::Receiver<IdentityEvent>) {
        let (sync, rx) = SyncQueue::new(WEBHOOK_SECRET);
        let clients = Clients::from_config(&IdpConfig {
            firebase_api_key: "test".into(),
            public_url: "http://localhost:8080".into(),
            client_url: "http://localhost:5173".into(),
            google: None,
            github: None,
        })
        .unwrap();

        let state = AppState {
            db_pool: self.db_pool.clone(),
            clients,
            sessions: self.sessions.clone(),
            chat: self.platform.clone(),
            sync,
            piston: PistonClient::new("http://127.0.0.1:9", Duration::from_millis(100)).unwrap(),
        };
        (state, rx)
    }
}
