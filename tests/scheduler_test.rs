use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use task_scheduler::{
    MemoryStore, SchedulerConfig, TaskDefinition, TaskDefinitionId, TaskExecution, Trigger,
};
use tracing_test::traced_test;

/// One-second windows all around, matching the cadence used throughout
/// the concrete scenarios below.
fn fast_config() -> SchedulerConfig {
    SchedulerConfig::new(
        Duration::from_secs(1),
        Duration::from_secs(1),
        Duration::from_secs(1),
    )
}

#[traced_test]
#[tokio::test]
async fn happy_path_one_shot_fires_exactly_once() {
    let calls = Arc::new(Mutex::new(Vec::<TaskDefinitionId>::new()));
    let recorded = calls.clone();
    let scheduler = task_scheduler::Scheduler::new(
        fast_config(),
        move |execution: TaskExecution| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(execution.definition.id);
                Ok(())
            }
        },
        MemoryStore::new(),
    )
    .await
    .unwrap();

    let def = TaskDefinition::new(
        serde_json::json!({"scenario": "happy_path"}),
        Trigger::one_shot(Utc::now() + chrono::Duration::seconds(1)),
    );
    let def_id = def.id;
    scheduler.upsert_definition(def).await.unwrap();

    let handle = tokio::spawn(async move { scheduler.run().await });
    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.abort();

    let seen = calls.lock().unwrap();
    assert_eq!(seen.as_slice(), &[def_id]);
}

#[traced_test]
#[tokio::test]
async fn long_running_handler_past_expiry_is_invoked_twice() {
    let calls = Arc::new(Mutex::new(Vec::<TaskDefinitionId>::new()));
    let recorded = calls.clone();
    let scheduler = task_scheduler::Scheduler::new(
        SchedulerConfig::new(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(1),
        ),
        move |execution: TaskExecution| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(execution.definition.id);
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok(())
            }
        },
        MemoryStore::new(),
    )
    .await
    .unwrap();

    let def = TaskDefinition::new(
        serde_json::json!({"scenario": "long_running_expired"}),
        Trigger::one_shot(Utc::now() + chrono::Duration::seconds(2)),
    )
    .with_expire_after(Duration::from_secs(2));
    let def_id = def.id;
    scheduler.upsert_definition(def).await.unwrap();

    let handle = tokio::spawn(async move { scheduler.run().await });
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.abort();

    let seen = calls.lock().unwrap();
    assert_eq!(seen.iter().filter(|id| **id == def_id).count(), 2);
}

#[traced_test]
#[tokio::test]
async fn long_running_handler_within_expiry_is_invoked_once() {
    let calls = Arc::new(Mutex::new(Vec::<TaskDefinitionId>::new()));
    let recorded = calls.clone();
    let scheduler = task_scheduler::Scheduler::new(
        fast_config(),
        move |execution: TaskExecution| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(execution.definition.id);
                tokio::time::sleep(Duration::from_secs(3)).await;
                Ok(())
            }
        },
        MemoryStore::new(),
    )
    .await
    .unwrap();

    let def = TaskDefinition::new(
        serde_json::json!({"scenario": "long_running_not_expired"}),
        Trigger::one_shot(Utc::now() + chrono::Duration::seconds(2)),
    )
    .with_expire_after(Duration::from_secs(4));
    let def_id = def.id;
    scheduler.upsert_definition(def).await.unwrap();

    let handle = tokio::spawn(async move { scheduler.run().await });
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.abort();

    let seen = calls.lock().unwrap();
    assert_eq!(seen.iter().filter(|id| **id == def_id).count(), 1);
}

#[traced_test]
#[tokio::test]
async fn retry_until_success_then_stops() {
    let attempts = Arc::new(Mutex::new(0usize));
    let counted = attempts.clone();
    let scheduler = task_scheduler::Scheduler::new(
        fast_config(),
        move |_execution: TaskExecution| {
            let counted = counted.clone();
            async move {
                let mut n = counted.lock().unwrap();
                *n += 1;
                if *n < 3 {
                    Err("not yet".into())
                } else {
                    Ok(())
                }
            }
        },
        MemoryStore::new(),
    )
    .await
    .unwrap();

    let now = Utc::now();
    let second = now.format("%S").to_string().parse::<u32>().unwrap();
    let next_second = (second + 1) % 60;
    let cron_expr = format!("{next_second} * * * * * *");
    let def = TaskDefinition::new(
        serde_json::json!({"scenario": "retry_until_success"}),
        Trigger::cron(&cron_expr).unwrap(),
    )
    .with_expire_after(Duration::from_secs(1));
    scheduler.upsert_definition(def).await.unwrap();

    let handle = tokio::spawn(async move { scheduler.run().await });
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.abort();

    assert_eq!(*attempts.lock().unwrap(), 3);
}

#[traced_test]
#[tokio::test]
async fn three_one_shots_fire_in_execute_at_order_regardless_of_upsert_order() {
    let calls = Arc::new(Mutex::new(Vec::<TaskDefinitionId>::new()));
    let recorded = calls.clone();
    let scheduler = task_scheduler::Scheduler::new(
        fast_config(),
        move |execution: TaskExecution| {
            let recorded = recorded.clone();
            async move {
                recorded.lock().unwrap().push(execution.definition.id);
                Ok(())
            }
        },
        MemoryStore::new(),
    )
    .await
    .unwrap();

    let now = Utc::now();
    let t1 = TaskDefinition::new(
        serde_json::json!({"order": 1}),
        Trigger::one_shot(now + chrono::Duration::seconds(3)),
    );
    let t2 = TaskDefinition::new(
        serde_json::json!({"order": 2}),
        Trigger::one_shot(now + chrono::Duration::seconds(5)),
    );
    let t3 = TaskDefinition::new(
        serde_json::json!({"order": 3}),
        Trigger::one_shot(now + chrono::Duration::seconds(7)),
    );
    let (t1_id, t2_id, t3_id) = (t1.id, t2.id, t3.id);

    // Upsert in reverse order.
    scheduler.upsert_definition(t3).await.unwrap();
    scheduler.upsert_definition(t2).await.unwrap();
    scheduler.upsert_definition(t1).await.unwrap();

    let handle = tokio::spawn(async move { scheduler.run().await });
    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.abort();

    let seen = calls.lock().unwrap();
    assert_eq!(seen.as_slice(), &[t1_id, t2_id, t3_id]);
}

#[traced_test]
#[tokio::test]
async fn cron_happy_path_fires_roughly_once_per_second() {
    let count = Arc::new(Mutex::new(0usize));
    let counted = count.clone();
    let scheduler = task_scheduler::Scheduler::new(
        fast_config(),
        move |_execution: TaskExecution| {
            let counted = counted.clone();
            async move {
                *counted.lock().unwrap() += 1;
                Ok(())
            }
        },
        MemoryStore::new(),
    )
    .await
    .unwrap();

    let def = TaskDefinition::new(
        serde_json::json!({"scenario": "cron_happy_path"}),
        Trigger::cron("* * * * * * *").unwrap(),
    );
    scheduler.upsert_definition(def).await.unwrap();

    let handle = tokio::spawn(async move { scheduler.run().await });
    tokio::time::sleep(Duration::from_millis(10_500)).await;
    handle.abort();

    let total = *count.lock().unwrap();
    assert!((9..=11).contains(&total), "expected 9..=11 calls, got {total}");
}

#[traced_test]
#[tokio::test]
async fn deleted_definition_is_no_longer_projected() {
    let calls = Arc::new(Mutex::new(0usize));
    let counted = calls.clone();
    let scheduler = Arc::new(
        task_scheduler::Scheduler::new(
            fast_config(),
            move |_execution: TaskExecution| {
                let counted = counted.clone();
                async move {
                    *counted.lock().unwrap() += 1;
                    Ok(())
                }
            },
            MemoryStore::new(),
        )
        .await
        .unwrap(),
    );

    let def = TaskDefinition::new(
        serde_json::json!({"scenario": "delete_stops_projection"}),
        Trigger::cron("* * * * * * *").unwrap(),
    );
    let def_id = def.id;
    scheduler.upsert_definition(def).await.unwrap();

    let runner = scheduler.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    tokio::time::sleep(Duration::from_secs(2)).await;

    scheduler.delete_definition(def_id).await.unwrap();
    let count_after_delete = *calls.lock().unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    scheduler.stop();
    handle.await.unwrap();

    assert_eq!(*calls.lock().unwrap(), count_after_delete);
    assert!(scheduler.get_definitions(&[def_id]).await.is_err());
}
