use super::*;
use crate::test_support::{failure, page, user, Call, ScriptedDirectory};
use tokio::sync::broadcast::error::TryRecvError;

fn manager_with(directory: &Arc<ScriptedDirectory>) -> UserManager {
    UserManager::new(directory.clone())
}

fn drain(events: &mut broadcast::Receiver<ManagerEvent>) -> Vec<ManagerEvent> {
    let mut seen = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => seen.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return seen,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

async fn seeded_manager(directory: &Arc<ScriptedDirectory>) -> UserManager {
    directory
        .push_list(OperationOutcome::Success(page(vec![
            user("1", "ada"),
            user("7", "grace"),
            user("9", "lin"),
        ])))
        .await;
    let mut manager = manager_with(directory);
    assert_eq!(manager.fetch_all().await, ActionPhase::Succeeded);
    manager
}

fn select(manager: &mut UserManager, ids: &[&str]) {
    for id in ids {
        manager.toggle_selection(UserId::new(*id), true);
    }
}

#[tokio::test]
async fn listing_two_users_replaces_collection_and_reports_count() {
    let directory = Arc::new(ScriptedDirectory::default());
    directory
        .push_list(OperationOutcome::Success(page(vec![
            user("u1", "ada"),
            user("u2", "grace"),
        ])))
        .await;
    let mut manager = manager_with(&directory);

    let phase = manager.fetch_all().await;

    assert_eq!(phase, ActionPhase::Succeeded);
    let ids: Vec<_> = manager.users().iter().filter_map(|u| u.id.clone()).collect();
    assert_eq!(ids, vec![UserId::new("u1"), UserId::new("u2")]);
    let status = manager.status();
    assert_eq!(status.progress, "Retrieved 2 users");
    assert!(status.error.is_empty());
    assert!(!status.busy);
}

#[tokio::test]
async fn empty_listing_reports_no_users() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = seeded_manager(&directory).await;
    directory
        .push_list(OperationOutcome::Success(page(Vec::new())))
        .await;

    manager.fetch_all().await;

    assert!(manager.users().is_empty());
    assert_eq!(manager.status().progress, "No users provisioned");
}

#[tokio::test]
async fn failed_listing_keeps_collection_and_shows_error() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = seeded_manager(&directory).await;
    let before = manager.users();
    directory
        .push_list(OperationOutcome::Failure(failure(
            "401",
            "Unauthorized: api key user not found",
        )))
        .await;

    let phase = manager.fetch_all().await;

    assert_eq!(phase, ActionPhase::Failed);
    assert!(Arc::ptr_eq(&before, &manager.users()));
    let status = manager.status();
    assert!(status.progress.is_empty());
    assert_eq!(status.error, "401: Unauthorized: api key user not found");
    assert!(!status.busy);
}

#[tokio::test]
async fn listing_with_duplicate_ids_is_rejected_as_local_error() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = seeded_manager(&directory).await;
    let before = manager.users();
    directory
        .push_list(OperationOutcome::Success(page(vec![
            user("3", "a"),
            user("3", "b"),
        ])))
        .await;

    assert_eq!(manager.fetch_all().await, ActionPhase::Failed);
    assert!(Arc::ptr_eq(&before, &manager.users()));
    assert!(manager
        .status()
        .error
        .starts_with("(Local Error) Failed to fetch users: duplicate user identifier 3"));
}

#[tokio::test]
async fn partial_batch_failure_clears_selection_without_refresh() {
    let directory = Arc::new(ScriptedDirectory::default());
    directory
        .fail_remove("b", failure("404", "user not found"))
        .await;
    let mut manager = manager_with(&directory);
    select(&mut manager, &["a", "b", "c"]);
    let mut events = manager.subscribe_events();

    let report = manager.delete_selected().await;

    assert_eq!(
        report.terminal,
        BatchTerminal::PartialFailure {
            deleted: 2,
            failed: 1
        }
    );
    assert!(manager.selection().is_empty());
    assert_eq!(directory.count(&Call::ListAll).await, 0);
    let status = manager.status();
    assert_eq!(status.progress, "Some delete operation(s) failed.");
    assert_eq!(status.error, "404: user not found");
    assert!(!status.busy);

    let seen = drain(&mut events);
    let failures: Vec<_> = seen
        .iter()
        .filter_map(|event| match event {
            ManagerEvent::DeleteFailed { id, .. } => Some(id.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![UserId::new("b")]);
    let terminals = seen
        .iter()
        .filter(|event| matches!(event, ManagerEvent::BatchFinished(_)))
        .count();
    assert_eq!(terminals, 1);
}

#[tokio::test]
async fn successful_batch_refreshes_exactly_once() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = manager_with(&directory);
    select(&mut manager, &["a", "b", "c"]);
    directory
        .push_list(OperationOutcome::Success(page(vec![user("z", "zed")])))
        .await;
    let mut events = manager.subscribe_events();

    let report = manager.delete_selected().await;

    assert_eq!(report.terminal, BatchTerminal::Succeeded { deleted: 3 });
    assert!(manager.selection().is_empty());
    assert_eq!(directory.count(&Call::ListAll).await, 1);
    let calls = directory.calls().await;
    assert_eq!(calls.last(), Some(&Call::ListAll));
    assert_eq!(manager.users().len(), 1);
    assert_eq!(manager.status().progress, "Retrieved 1 users");

    let seen = drain(&mut events);
    let finished_at = seen
        .iter()
        .position(|event| matches!(event, ManagerEvent::BatchFinished(_)))
        .expect("terminal event");
    let replaced_at = seen
        .iter()
        .position(|event| matches!(event, ManagerEvent::UsersReplaced(_)))
        .expect("refresh event");
    assert!(finished_at < replaced_at);
}

#[tokio::test]
async fn empty_selection_is_a_no_op_batch() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = manager_with(&directory);

    let report = manager.delete_selected().await;

    assert_eq!(report.terminal, BatchTerminal::Succeeded { deleted: 0 });
    assert!(directory.calls().await.is_empty());
    assert!(!manager.status().busy);
}

#[tokio::test]
async fn update_refetches_only_the_modified_user() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = seeded_manager(&directory).await;
    let before = manager.users();
    let edited = user("7", "grace").with_field("email", "grace@navy.mil");
    directory
        .set_get("7", OperationOutcome::Success(edited.clone()))
        .await;

    let phase = manager.update_user(edited.clone()).await;

    assert_eq!(phase, ActionPhase::Succeeded);
    let calls = directory.calls().await;
    assert_eq!(
        &calls[calls.len() - 2..],
        &[Call::Update(UserId::new("7")), Call::GetOne(UserId::new("7"))]
    );
    let after = manager.users();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(*after[1], edited);
    assert!(Arc::ptr_eq(&before[0], &after[0]));
    assert!(Arc::ptr_eq(&before[2], &after[2]));
    assert_eq!(manager.status().progress, "User has been modified");
}

#[tokio::test]
async fn update_with_numeric_server_id_refetches_that_user() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = seeded_manager(&directory).await;
    let before = manager.users();
    let from_server: UserRecord = serde_json::from_value(serde_json::json!({
        "id": 7,
        "username": "grace",
        "email": "grace@navy.mil"
    }))
    .expect("record");
    directory
        .set_update(OperationOutcome::Success(from_server.clone()))
        .await;
    directory
        .set_get("7", OperationOutcome::Success(from_server.clone()))
        .await;

    let phase = manager.update_user(user("7", "grace")).await;

    assert_eq!(phase, ActionPhase::Succeeded);
    assert_eq!(directory.count(&Call::GetOne(UserId::new("7"))).await, 1);
    let after = manager.users();
    assert_eq!(*after[1], from_server);
    assert!(Arc::ptr_eq(&before[0], &after[0]));
    assert!(Arc::ptr_eq(&before[2], &after[2]));
}

#[tokio::test]
async fn update_fails_when_the_refetch_fails() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = seeded_manager(&directory).await;
    let before = manager.users();
    directory
        .set_get("7", OperationOutcome::Failure(failure("503", "try again")))
        .await;

    let phase = manager.update_user(user("7", "grace")).await;

    assert_eq!(phase, ActionPhase::Failed);
    assert!(Arc::ptr_eq(&before, &manager.users()));
    let status = manager.status();
    assert_eq!(status.error, "503: try again");
    assert!(!status.busy);
}

#[tokio::test]
async fn create_fails_when_the_refresh_fails() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = manager_with(&directory);
    directory
        .push_list(OperationOutcome::Failure(failure("500", "upstream down")))
        .await;

    let phase = manager
        .create_user(UserRecord::default().with_field("username", "new"))
        .await;

    assert_eq!(phase, ActionPhase::Failed);
    assert_eq!(directory.calls().await, vec![Call::Create, Call::ListAll]);
    assert_eq!(manager.status().error, "500: upstream down");
}

#[tokio::test]
async fn failed_update_sets_error_and_skips_refetch() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = seeded_manager(&directory).await;
    directory
        .set_update(OperationOutcome::Failure(failure("400", "email is invalid")))
        .await;

    let phase = manager.update_user(user("7", "grace")).await;

    assert_eq!(phase, ActionPhase::Failed);
    assert_eq!(directory.count(&Call::GetOne(UserId::new("7"))).await, 0);
    assert_eq!(manager.status().error, "400: email is invalid");
}

#[tokio::test]
async fn create_refreshes_the_whole_collection() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = manager_with(&directory);
    directory
        .push_list(OperationOutcome::Success(page(vec![user("created-1", "new")])))
        .await;

    let phase = manager
        .create_user(UserRecord::default().with_field("username", "new"))
        .await;

    assert_eq!(phase, ActionPhase::Succeeded);
    assert_eq!(directory.calls().await, vec![Call::Create, Call::ListAll]);
    assert_eq!(manager.users().len(), 1);
}

#[tokio::test]
async fn failed_create_does_not_refresh() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = manager_with(&directory);
    directory
        .set_create(OperationOutcome::Failure(failure(
            "(Local Error) Failed to create user",
            "connection refused",
        )))
        .await;

    assert_eq!(
        manager.create_user(UserRecord::default()).await,
        ActionPhase::Failed
    );
    assert_eq!(directory.calls().await, vec![Call::Create]);
    assert_eq!(
        manager.status().error,
        "(Local Error) Failed to create user: connection refused"
    );
}

#[tokio::test]
async fn fetch_one_for_unknown_user_leaves_collection_untouched() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = seeded_manager(&directory).await;
    let before = manager.users();
    directory
        .set_get("42", OperationOutcome::Success(user("42", "ghost")))
        .await;

    assert_eq!(
        manager.fetch_one(&UserId::new("42")).await,
        ActionPhase::Succeeded
    );
    assert!(Arc::ptr_eq(&before, &manager.users()));
}

#[tokio::test]
async fn new_action_clears_error_before_setting_progress() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = manager_with(&directory);
    directory
        .push_list(OperationOutcome::Failure(failure("500", "upstream down")))
        .await;
    manager.fetch_all().await;
    assert_eq!(manager.status().error, "500: upstream down");
    let mut events = manager.subscribe_events();

    manager.fetch_all().await;

    let first_status = drain(&mut events)
        .into_iter()
        .find_map(|event| match event {
            ManagerEvent::Status(snapshot) => Some(snapshot),
            _ => None,
        })
        .expect("status event");
    assert!(first_status.error.is_empty());
    assert_eq!(first_status.progress, "Fetching all users ...");
    assert!(first_status.busy);
}

#[tokio::test]
async fn second_create_form_is_rejected_while_one_is_open() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = manager_with(&directory);

    assert!(manager.open_new_draft());
    assert!(!manager.open_new_draft());
    assert_eq!(
        manager.draft().map(|draft| draft.kind.clone()),
        Some(DraftKind::New)
    );

    manager.cancel();
    assert!(manager.draft().is_none());
    assert!(manager.open_new_draft());
}

#[tokio::test]
async fn details_toggle_and_save_issue_update() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = seeded_manager(&directory).await;
    let grace = UserId::new("7");

    assert!(manager.open_details(&grace));
    assert!(!manager.open_details(&grace));
    assert!(manager.draft().is_none());
    assert!(!manager.open_details(&UserId::new("missing")));

    assert!(manager.open_details(&grace));
    directory
        .set_get("7", OperationOutcome::Success(user("7", "grace-h")))
        .await;
    let phase = manager
        .save_draft(UserRecord::default().with_field("username", "grace-h"))
        .await;

    assert_eq!(phase, ActionPhase::Succeeded);
    assert!(manager.draft().is_none());
    assert!(directory.calls().await.contains(&Call::Update(grace)));
}

#[tokio::test]
async fn save_without_open_form_sends_nothing() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = manager_with(&directory);

    assert_eq!(
        manager.save_draft(UserRecord::default()).await,
        ActionPhase::Idle
    );
    assert!(directory.calls().await.is_empty());
}

#[tokio::test]
async fn cancel_clears_selection_but_fetch_all_keeps_it() {
    let directory = Arc::new(ScriptedDirectory::default());
    let mut manager = seeded_manager(&directory).await;
    select(&mut manager, &["1", "9"]);
    manager.open_new_draft();

    manager.fetch_all().await;
    assert!(manager.draft().is_none());
    assert_eq!(manager.selection().len(), 2);

    manager.cancel();
    assert!(manager.selection().is_empty());
}
