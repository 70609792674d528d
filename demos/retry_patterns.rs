//! Retry Patterns Example
//!
//! Demonstrates the retry executor against simulated backend calls:
//! - One-off retry with exponential backoff
//! - Progress reporting through a tracker subscription
//! - Per-attempt timeouts
//! - Cancelling a retry that is waiting out its backoff

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use growth_retry::{
    retry, retry_until_cancelled, with_timeout, RetryEvent, RetryPhase, RetryPolicy, RetryTracker,
};
use tokio_util::sync::CancellationToken;

// ==================== One-off Retry ====================

/// Example 1: Fetch subscription status, failing twice before the backend answers.
async fn example_basic_retry() {
    println!("\n=== Example 1: Basic Retry ===");

    let counter = AtomicU32::new(0);
    let calls = &counter;
    let policy = RetryPolicy::exponential(Duration::from_millis(100)).with_max_retries(5);

    let result = retry(&policy, || async move {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        println!("  Attempt {}", n + 1);
        if n < 2 {
            Err("503 service unavailable")
        } else {
            Ok("active")
        }
    })
    .await;

    println!(
        "Subscription status: {:?} after {} calls",
        result,
        counter.load(Ordering::SeqCst)
    );
}

// ==================== Progress Reporting ====================

/// Example 2: Render "retry attempt N of M" from a tracker subscription.
async fn example_tracker_progress() {
    println!("\n=== Example 2: Tracker Progress ===");

    let mut tracker = RetryTracker::<String>::new();
    let mut updates = tracker.subscribe();
    let policy = RetryPolicy::linear(Duration::from_millis(50)).with_max_retries(3);

    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if state.phase == RetryPhase::Attempting && state.attempt > 0 {
                println!("  retry attempt {} of {}", state.attempt, state.max_retries);
            }
            if state.phase.is_terminal() {
                break;
            }
        }
    });

    let counter = AtomicU32::new(0);
    let calls = &counter;
    let result = tracker
        .execute_with_hooks(
            &policy,
            || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err("network offline".to_string())
                } else {
                    Ok("dashboard loaded".to_string())
                }
            },
            |event: &RetryEvent<'_, String>| {
                println!("  {} (next try in {:?})", event.error, event.next_delay);
            },
        )
        .await;

    let _ = printer.await;
    println!("Result: {:?}", result);
    println!("Final state: {:?}", tracker.state());
}

// ==================== Timeouts ====================

/// Example 3: Bound each attempt so a hung request counts as a failure.
async fn example_timeout_per_attempt() {
    println!("\n=== Example 3: Timeout Per Attempt ===");

    let counter = AtomicU32::new(0);
    let calls = &counter;
    let policy = RetryPolicy::linear(Duration::from_millis(10)).with_max_retries(3);

    let result = retry(&policy, || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        with_timeout(Duration::from_millis(50), async move {
            if n == 0 {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok::<_, String>("events flushed")
        })
    })
    .await;

    println!(
        "Result: {:?} after {} calls",
        result,
        counter.load(Ordering::SeqCst)
    );
}

// ==================== Cancellation ====================

/// Example 4: The user navigates away while the retry is backing off.
async fn example_cancellation() {
    println!("\n=== Example 4: Cancellation ===");

    let token = CancellationToken::new();
    let policy = RetryPolicy::exponential(Duration::from_secs(30)).with_max_retries(3);

    let canceller = {
        let token = token.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            println!("  user left the page, cancelling");
            token.cancel();
        }
    };

    let (result, ()) = tokio::join!(
        retry_until_cancelled(
            &policy,
            || async { Err::<(), _>("chat widget unreachable") },
            |_| {},
            &token,
        ),
        canceller
    );

    println!("Result: {:?}", result);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    example_basic_retry().await;
    example_tracker_progress().await;
    example_timeout_per_attempt().await;
    example_cancellation().await;
}
