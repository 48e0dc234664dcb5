mod common;

use common::{MockBackend, EMAIL, PASSWORD, TOKEN};
use taskdeck_client::{ApiClient, ApiError, AuthState, SessionStore};
use taskdeck_core::{AgentName, Credential, RunId};

fn client(backend: &MockBackend) -> (ApiClient, SessionStore) {
    let session = SessionStore::new();
    let api = ApiClient::new(&backend.config(), session.clone()).unwrap();
    (api, session)
}

#[tokio::test]
async fn login_establishes_the_session() {
    let backend = MockBackend::start().await;
    let (api, session) = client(&backend);

    let context = api.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(context.credential().expose(), TOKEN);
    assert_eq!(context.display_name(), "Admin");
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn bad_password_surfaces_detail_and_stays_anonymous() {
    let backend = MockBackend::start().await;
    let (api, session) = client(&backend);

    let err = api.login(EMAIL, "nope").await.unwrap_err();
    match err {
        ApiError::Status { status, detail } => {
            assert_eq!(status, 401);
            assert_eq!(detail, "Incorrect email or password");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.state(), AuthState::Anonymous { reason: None });
}

#[tokio::test]
async fn resume_validates_a_supplied_token() {
    let backend = MockBackend::start().await;
    let (api, session) = client(&backend);

    let context = api.resume(Credential::new(TOKEN).unwrap()).await.unwrap();
    assert_eq!(context.user().map(|user| user.email.as_str()), Some(EMAIL));

    let (stale, stale_session) = client(&backend);
    let err = stale
        .resume(Credential::new("expired").unwrap())
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert!(!stale_session.is_authenticated());
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn calls_without_a_session_are_refused_locally() {
    let backend = MockBackend::start().await;
    let (api, _session) = client(&backend);
    assert!(matches!(api.models().await, Err(ApiError::NotAuthenticated)));
}

#[tokio::test]
async fn models_and_history_use_the_bearer_contract() {
    let backend = MockBackend::start().await;
    let (api, _session) = client(&backend);
    api.login(EMAIL, PASSWORD).await.unwrap();

    let models = api.models().await.unwrap();
    let names: Vec<&str> = models.iter().map(|model| model.name.as_str()).collect();
    assert_eq!(names, ["llama3", "codellama"]);

    let tasks = api.tasks().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, RunId::from(12));
    assert_eq!(tasks[0].status, "completed");

    let logs = api.task_logs(&tasks[0].id).await.unwrap();
    let events: Vec<_> = logs
        .iter()
        .enumerate()
        .map(|(index, record)| record.to_log_event(index as u64))
        .collect();
    assert_eq!(events[1].agent, AgentName::Orchestrator);

    match api.task_logs(&RunId::from(99)).await {
        Err(ApiError::Status { status, detail }) => {
            assert_eq!(status, 404);
            assert_eq!(detail, "Task not found");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn any_401_discards_the_credential() {
    let backend = MockBackend::start().await;
    let (api, session) = client(&backend);
    api.login(EMAIL, PASSWORD).await.unwrap();
    let mut auth = session.subscribe();

    backend.revoke_tokens();
    assert!(matches!(api.tasks().await, Err(ApiError::Unauthorized)));
    assert!(auth.has_changed().unwrap());
    match &*auth.borrow_and_update() {
        AuthState::Anonymous { reason } => {
            assert_eq!(reason.as_deref(), Some("401 from /api/tasks/"))
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(api.models().await, Err(ApiError::NotAuthenticated)));
}
