use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::models::match_history::{GameResult, MatchHistory};
use crate::models::room::Room;
use crate::repositories::errors::RepositoryError;
use crate::repositories::Repositories;

#[derive(Debug, Clone)]
pub enum PersistJob {
    SaveRoom(Box<Room>),
    SaveHistory(Box<MatchHistory>),
    UpdateAccount {
        account_id: String,
        result: GameResult,
        rating_after: i32,
    },
}

impl PersistJob {
    fn describe(&self) -> String {
        match self {
            PersistJob::SaveRoom(room) => format!("save room {}", room.room_id),
            PersistJob::SaveHistory(record) => format!("save history {}", record.history_id),
            PersistJob::UpdateAccount { account_id, .. } => format!("update account {}", account_id),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

/// Write-ahead queue between the realtime path and the durable stores.
/// Enqueueing never waits.
#[derive(Clone)]
pub struct PersistenceQueue {
    sender: mpsc::Sender<PersistJob>,
}

impl PersistenceQueue {
    pub fn start(
        repositories: Repositories,
        capacity: usize,
        policy: RetryPolicy,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let worker = tokio::spawn(run_worker(receiver, repositories, policy));
        (PersistenceQueue { sender }, worker)
    }

    /// Returns false when the job was dropped because the queue is full or closed.
    pub fn enqueue(&self, job: PersistJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(job = %job.describe(), "Persistence queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                error!(job = %job.describe(), "Persistence worker stopped, dropping job");
                false
            }
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<PersistJob>,
    repositories: Repositories,
    policy: RetryPolicy,
) {
    while let Some(job) = receiver.recv().await {
        let mut backoff = policy.initial_backoff;
        let mut attempt = 1;
        loop {
            match execute(&job, &repositories).await {
                Ok(()) => {
                    debug!(job = %job.describe(), attempt, "Persisted");
                    break;
                }
                Err(e) if attempt < policy.max_attempts => {
                    warn!(job = %job.describe(), attempt, error = %e, "Persistence failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => {
                    error!(job = %job.describe(), attempt, error = %e, "Persistence failed, giving up");
                    break;
                }
            }
        }
    }
}

async fn execute(job: &PersistJob, repositories: &Repositories) -> Result<(), RepositoryError> {
    match job {
        PersistJob::SaveRoom(room) => repositories.rooms.save_room(room).await,
        PersistJob::SaveHistory(record) => repositories.history.create_record(record).await,
        PersistJob::UpdateAccount {
            account_id,
            result,
            rating_after,
        } => {
            let mut user = repositories.users.get_user_by_id(account_id).await?;
            user.rating = *rating_after;
            user.record_result(*result);
            repositories.users.update_user(&user).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::player::PlayerProfile;
    use crate::models::room::{Color, MatchKind, TimeControl};
    use crate::models::user::User;
    use crate::repositories::match_history_repository::InMemoryMatchHistoryRepository;
    use crate::repositories::room_repository::MockRoomRepository;
    use crate::repositories::user_repository::{InMemoryUserRepository, UserRepository};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn room() -> Room {
        Room::new(
            &PlayerProfile::guest("guest_a", "Visitor"),
            Color::White,
            MatchKind::Casual,
            TimeControl::Unlimited,
            false,
            0,
        )
    }

    fn repositories(rooms: MockRoomRepository, users: Arc<InMemoryUserRepository>) -> Repositories {
        Repositories {
            rooms: Arc::new(rooms),
            history: Arc::new(InMemoryMatchHistoryRepository::new()),
            users,
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(200),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_is_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut rooms = MockRoomRepository::new();
        rooms.expect_save_room().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RepositoryError::Unavailable("throttled".to_string()))
            } else {
                Ok(())
            }
        });
        let (queue, _worker) = PersistenceQueue::start(
            repositories(rooms, Arc::new(InMemoryUserRepository::new())),
            8,
            policy(3),
        );

        assert!(queue.enqueue(PersistJob::SaveRoom(Box::new(room()))));
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut rooms = MockRoomRepository::new();
        rooms.expect_save_room().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(RepositoryError::DynamoDb("down".to_string()))
        });
        let (queue, _worker) = PersistenceQueue::start(
            repositories(rooms, Arc::new(InMemoryUserRepository::new())),
            8,
            policy(3),
        );

        queue.enqueue(PersistJob::SaveRoom(Box::new(room())));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_update_sets_rating_and_counters() {
        let users = Arc::new(InMemoryUserRepository::new());
        let user = User::new("magnus".to_string());
        users.create_user(&user).await.unwrap();
        let (queue, _worker) =
            PersistenceQueue::start(repositories(MockRoomRepository::new(), users.clone()), 8, policy(3));

        queue.enqueue(PersistJob::UpdateAccount {
            account_id: user.id.clone(),
            result: GameResult::Win,
            rating_after: 1220,
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let stored = users.get_user_by_id(&user.id).await.unwrap();
        assert_eq!(stored.rating, 1220);
        assert_eq!((stored.games_played, stored.wins), (1, 1));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_waiting() {
        let (sender, _receiver) = mpsc::channel(1);
        let queue = PersistenceQueue { sender };

        assert!(queue.enqueue(PersistJob::SaveRoom(Box::new(room()))));
        assert!(!queue.enqueue(PersistJob::SaveRoom(Box::new(room()))));
    }
}
