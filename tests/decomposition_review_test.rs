//! Decomposition into temporary workers, dependency ordering and the
//! manager's review of the finished subtree.

mod common;

use common::TestEnv;
use hollon::adapters::brain::MockResponse;
use hollon::domain::models::{EstimatedComplexity, Hollon, Task, TaskStatus, TaskType};
use hollon::services::{CycleOutcome, HollonOrchestrator};

const PLAN: &str = r#"Here is the split:
```json
{
  "subtasks": [
    {"title": "Users table", "description": "Create the users table with email and password hash",
     "type": "implementation", "priority": "p2", "roleId": "engineer", "affectedFiles": [], "dependencies": []},
    {"title": "Login form", "description": "Connect the form to the session store",
     "type": "implementation", "priority": "p3", "roleId": null, "affectedFiles": [], "dependencies": ["Users table"]}
  ],
  "reasoning": "storage before the form"
}
```"#;

struct Tree {
    manager: Hollon,
    parent: Task,
    table: Task,
    form: Task,
}

async fn delegated_tree(env: &TestEnv, orchestrator: &HollonOrchestrator) -> Tree {
    let lead = env.role("lead", &["planning"], false).await;
    env.role("engineer", &["rust", "sql"], true).await;
    let manager = env.hollon("manager", &lead).await;
    let parent = env
        .save(
            env.task("Login feature")
                .with_type(TaskType::Epic)
                .with_complexity(EstimatedComplexity::High),
        )
        .await;
    env.brain.push_response(MockResponse::success(PLAN)).await;

    let outcome = orchestrator.run_cycle(manager.id).await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Delegated {
            task_id: parent.id,
            subtask_count: 2
        }
    );

    let subtasks = env.ports.tasks.get_subtasks(parent.id).await.unwrap();
    let table = subtasks.iter().find(|t| t.title == "Users table").cloned().unwrap();
    let form = subtasks.iter().find(|t| t.title == "Login form").cloned().unwrap();
    Tree {
        manager,
        parent,
        table,
        form,
    }
}

#[tokio::test]
async fn test_subtasks_run_in_dependency_order_and_parent_is_reviewed() {
    let env = TestEnv::new().await;
    let orchestrator = env.orchestrator();
    let t = delegated_tree(&env, &orchestrator).await;

    assert_eq!(t.table.status, TaskStatus::Ready);
    assert_eq!(t.form.status, TaskStatus::Blocked);
    assert_eq!(t.form.dependencies, vec![t.table.id]);
    assert_eq!(env.reload(&t.parent).await.status, TaskStatus::InProgress);

    let table_worker = t.table.assigned_hollon_id.unwrap();
    let form_worker = t.form.assigned_hollon_id.unwrap();
    let worker = env.ports.hollons.get(table_worker).await.unwrap().unwrap();
    assert!(worker.is_temporary());
    assert_eq!(worker.depth, 1);
    assert_eq!(worker.parent_hollon_id, Some(t.manager.id));

    // Blocked work is invisible to its worker; the manager waits on its children
    assert_eq!(orchestrator.run_cycle(form_worker).await.unwrap(), CycleOutcome::NoTask);
    assert_eq!(orchestrator.run_cycle(t.manager.id).await.unwrap(), CycleOutcome::NoTask);

    env.brain
        .push_response(MockResponse::success("Users table created with email and password_hash columns."))
        .await;
    assert_eq!(
        orchestrator.run_cycle(table_worker).await.unwrap(),
        CycleOutcome::Completed { task_id: t.table.id }
    );
    assert_eq!(env.reload(&t.form).await.status, TaskStatus::Ready);
    assert!(env.ports.hollons.get(table_worker).await.unwrap().is_none());

    env.brain
        .push_response(MockResponse::success("Form posts credentials to the session store."))
        .await;
    assert_eq!(
        orchestrator.run_cycle(form_worker).await.unwrap(),
        CycleOutcome::Completed { task_id: t.form.id }
    );
    let requests = env.brain.requests().await;
    let form_context = requests.last().unwrap().context.clone().unwrap_or_default();
    assert!(form_context.contains("password_hash"), "dependency result missing from context");

    let parent = env.reload(&t.parent).await;
    assert_eq!(parent.status, TaskStatus::ReadyForReview);
    assert_eq!(parent.reviewer_hollon_id, Some(t.manager.id));

    env.brain
        .push_response(MockResponse::success(
            r#"{"action": "complete", "reasoning": "storage and form both delivered"}"#,
        ))
        .await;
    assert_eq!(
        orchestrator.run_cycle(t.manager.id).await.unwrap(),
        CycleOutcome::Reviewed {
            task_id: t.parent.id,
            action: "complete".to_string()
        }
    );
    assert_eq!(env.reload(&t.parent).await.status, TaskStatus::Completed);
    assert_eq!(env.ports.hollons.count_temporary_children(t.manager.id).await.unwrap(), 0);
    assert_eq!(env.brain.call_count().await, 4);
}

#[tokio::test]
async fn test_rework_respawns_worker_and_returns_to_review() {
    let env = TestEnv::new().await;
    let orchestrator = env.orchestrator();
    let t = delegated_tree(&env, &orchestrator).await;

    for (task, output) in [(&t.table, "Users table created."), (&t.form, "Form wired to sessions.")] {
        env.brain.push_response(MockResponse::success(output)).await;
        let worker = task.assigned_hollon_id.unwrap();
        assert_eq!(
            orchestrator.run_cycle(worker).await.unwrap(),
            CycleOutcome::Completed { task_id: task.id }
        );
    }

    let rework = format!(
        r#"{{"action": "rework", "reasoning": "no unique index", "subtaskIds": ["{}"], "reworkInstructions": "Add a unique index on email"}}"#,
        t.table.id
    );
    env.brain.push_response(MockResponse::success(rework)).await;
    assert_eq!(
        orchestrator.run_cycle(t.manager.id).await.unwrap(),
        CycleOutcome::Reviewed {
            task_id: t.parent.id,
            action: "rework".to_string()
        }
    );

    let parent = env.reload(&t.parent).await;
    assert_eq!(parent.status, TaskStatus::InProgress);
    assert!(parent.reviewer_hollon_id.is_none());

    let table = env.reload(&t.table).await;
    assert_eq!(table.status, TaskStatus::Ready);
    assert_eq!(table.retry_count, 1);
    assert!(table.description.contains("unique index on email"));
    assert!(table.completed_at.is_none());
    let new_worker = env
        .ports
        .hollons
        .get(table.assigned_hollon_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(new_worker.is_temporary());
    assert!(new_worker.name.starts_with("manager-rework-"));

    env.brain.push_response(MockResponse::success("Unique index on email added.")).await;
    assert_eq!(
        orchestrator.run_cycle(new_worker.id).await.unwrap(),
        CycleOutcome::Completed { task_id: t.table.id }
    );
    assert_eq!(env.reload(&t.parent).await.status, TaskStatus::ReadyForReview);
}

#[tokio::test]
async fn test_unusable_plan_executes_directly() {
    let env = TestEnv::new().await;
    let orchestrator = env.orchestrator();
    let lead = env.role("lead", &["planning"], false).await;
    env.role("engineer", &["rust"], true).await;
    let manager = env.hollon("manager", &lead).await;
    let parent = env
        .save(env.task("Onboarding guide").with_type(TaskType::Epic))
        .await;
    env.brain.push_response(MockResponse::success("I would rather not plan.")).await;
    env.brain.push_response(MockResponse::success("Guide written end to end.")).await;

    assert_eq!(
        orchestrator.run_cycle(manager.id).await.unwrap(),
        CycleOutcome::Completed { task_id: parent.id }
    );
    assert!(env.ports.tasks.get_subtasks(parent.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_plan_with_incomplete_subtasks_executes_directly() {
    let env = TestEnv::new().await;
    let orchestrator = env.orchestrator();
    let lead = env.role("lead", &["planning"], false).await;
    env.role("engineer", &["rust"], true).await;
    let manager = env.hollon("manager", &lead).await;
    let parent = env
        .save(env.task("Onboarding guide").with_type(TaskType::Epic))
        .await;
    // No type, priority or dependencies, and an unknown priority on the second entry
    env.brain
        .push_response(MockResponse::success(
            r#"{"subtasks": [
                {"title": "Outline", "description": "List the chapters"},
                {"title": "Draft", "description": "Write it", "type": "documentation", "priority": "asap",
                 "roleId": null, "affectedFiles": [], "dependencies": []}
            ]}"#,
        ))
        .await;
    env.brain.push_response(MockResponse::success("Guide written end to end.")).await;

    assert_eq!(
        orchestrator.run_cycle(manager.id).await.unwrap(),
        CycleOutcome::Completed { task_id: parent.id }
    );
    assert!(env.ports.tasks.get_subtasks(parent.id).await.unwrap().is_empty());
    assert_eq!(env.ports.hollons.count_temporary_children(manager.id).await.unwrap(), 0);
}
