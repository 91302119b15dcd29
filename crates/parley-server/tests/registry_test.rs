//! Client registry tests under real task concurrency.

use parley_proto::Identifier;
use parley_server::{ClientRegistry, PeerHandle};
use tokio::sync::mpsc;

fn id(s: &str) -> Identifier {
    Identifier::parse(s).unwrap()
}

fn handle(conn_id: u64) -> PeerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx); // routing is irrelevant to claim accounting
    PeerHandle::new(conn_id, tx)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_of_one_id_have_exactly_one_winner() {
    let registry = ClientRegistry::new();

    let mut racers = Vec::new();
    for conn_id in 0..64u64 {
        let registry = registry.clone();
        racers.push(tokio::spawn(async move {
            registry.try_claim(id("abcd1234"), handle(conn_id)).await
        }));
    }

    let mut winners = 0;
    for racer in racers {
        if racer.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1, "exactly one concurrent claim may succeed");
    assert_eq!(registry.len().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_ids_do_not_contend() {
    let registry = ClientRegistry::new();

    let mut tasks = Vec::new();
    for n in 0..32u64 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            registry.try_claim(id(&format!("peer{n:04}")), handle(n)).await
        }));
    }

    for task in tasks {
        assert!(task.await.unwrap());
    }
    assert_eq!(registry.len().await, 32);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn claim_release_cycles_never_lose_the_slot() {
    let registry = ClientRegistry::new();

    // Tasks repeatedly fight for one id; every successful claim is released.
    // If check-then-insert raced, a stale entry would eventually wedge the
    // slot and later rounds would find no winner.
    let mut tasks = Vec::new();
    for conn_id in 0..8u64 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let mut wins = 0u32;
            for _ in 0..50 {
                if registry.try_claim(id("contest1"), handle(conn_id)).await {
                    wins += 1;
                    tokio::task::yield_now().await;
                    assert!(registry.release(&id("contest1")).await);
                }
            }
            wins
        }));
    }

    let mut total = 0;
    for task in tasks {
        total += task.await.unwrap();
    }

    assert!(total > 0, "some claims must have succeeded");
    assert!(registry.is_empty().await, "every win was released");

    // The slot is still claimable after all that churn.
    assert!(registry.try_claim(id("contest1"), handle(99)).await);
}
