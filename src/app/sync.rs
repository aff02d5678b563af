// Drives the task client through the query cache.
// Network calls run as spawned tasks and report back as SyncEvents; the
// cache is only ever touched by whoever owns the TodoSync (the UI loop).
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::api::TodoApi;
use crate::app::cache::{MutationId, MutationVariables, QueryCache, QueryKey};
use crate::app::error::ClientError;
use crate::app::models::{NewTask, Task, TaskId, TaskPatch, UserId};

#[derive(Debug)]
pub enum SyncEvent {
    Fetched {
        key: QueryKey,
        generation: u64,
        result: Result<Vec<Task>, ClientError>,
    },
    Settled {
        id: MutationId,
        result: Result<(), ClientError>,
    },
}

pub struct TodoSync {
    api: Arc<dyn TodoApi>,
    cache: QueryCache,
    user: UserId,
    filter: Option<bool>,
    events: mpsc::UnboundedSender<SyncEvent>,
}

impl TodoSync {
    pub fn new(
        api: Arc<dyn TodoApi>,
        user: UserId,
        filter: Option<bool>,
    ) -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let sync = TodoSync {
            api,
            cache: QueryCache::new(),
            user,
            filter,
            events,
        };
        (sync, receiver)
    }

    pub fn user(&self) -> UserId {
        self.user
    }

    pub fn list_key(&self) -> QueryKey {
        QueryKey::todos(self.user, self.filter)
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    // Read path: start a fetch of the task list if it is missing or stale
    pub fn ensure_todos(&mut self) {
        let key = self.list_key();
        if !self.cache.needs_fetch(&key) {
            return;
        }

        let generation = self.cache.begin_fetch(key);
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let (user, filter) = (self.user, self.filter);
        tokio::spawn(async move {
            let result = api.list_todos(user, filter).await;
            if events.send(SyncEvent::Fetched { key, generation, result }).is_err() {
                debug!("sync receiver gone, dropping fetch result");
            }
        });
    }

    // Forces a refetch even when the cached list is fresh
    pub fn refresh(&mut self) {
        self.cache.invalidate_user(self.user);
        self.ensure_todos();
    }

    pub fn create(&mut self, todo: NewTask) -> MutationId {
        info!(name = %todo.name, user = %self.user, "creating task");
        let user = self.user;
        let id = self.cache.begin_mutation(MutationVariables::Create {
            user,
            todo: todo.clone(),
        });
        self.spawn_mutation(id, move |api| async move {
            api.create_todo(user, &todo).await.map(drop)
        });
        id
    }

    /// Flips completion relative to the given snapshot. Ignored while another
    /// mutation on the same task is in flight.
    pub fn toggle(&mut self, task: &Task) -> Option<MutationId> {
        if self.cache.is_task_pending(task.id) {
            return None;
        }
        info!(id = %task.id, completed = !task.completed, "toggling task");
        let (task_id, patch) = (task.id, task.toggled());
        let id = self.cache.begin_mutation(MutationVariables::Update {
            id: task_id,
            patch: patch.clone(),
        });
        self.spawn_mutation(id, move |api| async move {
            api.update_todo(task_id, &patch).await.map(drop)
        });
        Some(id)
    }

    // Marks the task done through the dedicated endpoint; a no-op for tasks
    // that are already completed or busy
    pub fn complete(&mut self, task: &Task) -> Option<MutationId> {
        if task.completed || self.cache.is_task_pending(task.id) {
            return None;
        }
        info!(id = %task.id, "completing task");
        let task_id = task.id;
        let id = self.cache.begin_mutation(MutationVariables::Update {
            id: task_id,
            patch: TaskPatch::completion(true),
        });
        self.spawn_mutation(id, move |api| async move { api.complete_todo(task_id).await });
        Some(id)
    }

    pub fn delete(&mut self, task_id: TaskId) -> Option<MutationId> {
        if self.cache.is_task_pending(task_id) {
            return None;
        }
        info!(id = %task_id, "deleting task");
        let id = self.cache.begin_mutation(MutationVariables::Delete { id: task_id });
        self.spawn_mutation(id, move |api| async move { api.delete_todo(task_id).await });
        Some(id)
    }

    fn spawn_mutation<F, Fut>(&self, id: MutationId, call: F)
    where
        F: FnOnce(Arc<dyn TodoApi>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), ClientError>> + Send + 'static,
    {
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = call(api).await;
            if events.send(SyncEvent::Settled { id, result }).is_err() {
                debug!(?id, "sync receiver gone, dropping mutation outcome");
            }
        });
    }

    // Applies a finished network call to the cache and schedules follow-up reads
    pub fn apply(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Fetched { key, generation, result } => {
                let result = result.map_err(|err| {
                    warn!(?key, error = %err, "task list fetch failed");
                    err.to_string()
                });
                if self.cache.complete_fetch(key, generation, result) {
                    debug!(?key, generation, "task list updated");
                }
            }
            SyncEvent::Settled { id, result } => {
                let outcome = result.map_err(|err| {
                    warn!(?id, error = %err, "mutation failed");
                    err.to_string()
                });
                self.cache.settle_mutation(id, outcome);
            }
        }
        self.ensure_todos();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::InMemoryTodoApi;
    use super::*;
    use pretty_assertions::assert_eq;

    const USER: UserId = UserId(7);

    fn sync_with(api: &Arc<InMemoryTodoApi>) -> (TodoSync, mpsc::UnboundedReceiver<SyncEvent>) {
        let api: Arc<dyn TodoApi> = api.clone();
        TodoSync::new(api, USER, None)
    }

    // Feed events back until nothing is fetching or pending
    async fn settle(sync: &mut TodoSync, events: &mut mpsc::UnboundedReceiver<SyncEvent>) {
        sync.ensure_todos();
        while sync.cache().read(&sync.list_key()).is_fetching
            || sync.cache().has_pending_mutations()
        {
            let event = events.recv().await.expect("sync channel closed");
            sync.apply(event);
        }
    }

    fn names(sync: &TodoSync) -> Vec<String> {
        sync.cache()
            .read(&sync.list_key())
            .data
            .unwrap_or_default()
            .iter()
            .map(|task| task.name.clone())
            .collect()
    }

    #[tokio::test]
    async fn first_read_fetches_the_list() {
        let api = Arc::new(InMemoryTodoApi::default());
        api.seed(USER, "Walk dog", false).await;
        api.seed(UserId(8), "someone else", false).await;
        let (mut sync, mut events) = sync_with(&api);

        sync.ensure_todos();
        assert!(sync.cache().read(&sync.list_key()).is_fetching);
        settle(&mut sync, &mut events).await;

        assert_eq!(names(&sync), vec!["Walk dog"]);
    }

    #[tokio::test]
    async fn creation_shows_a_placeholder_until_the_refetch() {
        let api = Arc::new(InMemoryTodoApi::default());
        let (mut sync, mut events) = sync_with(&api);
        settle(&mut sync, &mut events).await;

        sync.create(NewTask::named("Buy milk"));
        assert_eq!(sync.cache().pending_creations(), vec!["Buy milk"]);

        let settled = events.recv().await.unwrap();
        assert!(matches!(settled, SyncEvent::Settled { result: Ok(()), .. }));
        sync.apply(settled);
        // still provisional: the refetch has not landed yet
        assert_eq!(sync.cache().pending_creations(), vec!["Buy milk"]);

        settle(&mut sync, &mut events).await;
        assert!(sync.cache().pending_creations().is_empty());
        assert_eq!(names(&sync), vec!["Buy milk"]);

        let list = sync.cache().read(&sync.list_key()).data.unwrap();
        assert!(!list[0].completed);
    }

    #[tokio::test]
    async fn one_placeholder_per_pending_creation() {
        let api = Arc::new(InMemoryTodoApi::default());
        let (mut sync, mut events) = sync_with(&api);
        settle(&mut sync, &mut events).await;

        sync.create(NewTask::named("one"));
        sync.create(NewTask::named("two"));
        assert_eq!(sync.cache().pending_creations(), vec!["one", "two"]);

        for _ in 0..2 {
            let event = events.recv().await.unwrap();
            sync.apply(event);
        }
        settle(&mut sync, &mut events).await;

        assert!(sync.cache().pending_creations().is_empty());
        assert_eq!(names(&sync), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn toggling_twice_restores_completion() {
        let api = Arc::new(InMemoryTodoApi::default());
        let task = api.seed(USER, "Walk dog", false).await;
        let (mut sync, mut events) = sync_with(&api);
        settle(&mut sync, &mut events).await;

        for expected in [true, false] {
            let current = sync.cache().read(&sync.list_key()).data.unwrap()[0].clone();
            assert!(sync.toggle(&current).is_some());
            assert!(sync.cache().is_task_pending(task.id));
            // a second click on the same row is ignored while pending
            assert!(sync.toggle(&current).is_none());

            let event = events.recv().await.unwrap();
            sync.apply(event);
            settle(&mut sync, &mut events).await;

            let after = &sync.cache().read(&sync.list_key()).data.unwrap()[0];
            assert_eq!(after.completed, expected);
            assert!(!sync.cache().is_task_pending(task.id));
        }
    }

    #[tokio::test]
    async fn completing_marks_the_task_done_after_the_refetch() {
        let api = Arc::new(InMemoryTodoApi::default());
        let task = api.seed(USER, "Walk dog", false).await;
        let (mut sync, mut events) = sync_with(&api);
        settle(&mut sync, &mut events).await;

        let current = sync.cache().read(&sync.list_key()).data.unwrap()[0].clone();
        assert!(sync.complete(&current).is_some());
        assert!(sync.cache().is_task_pending(task.id));
        assert!(sync.complete(&current).is_none());

        let event = events.recv().await.unwrap();
        sync.apply(event);
        settle(&mut sync, &mut events).await;

        let after = sync.cache().read(&sync.list_key()).data.unwrap()[0].clone();
        assert_eq!(after.id, task.id);
        assert!(after.completed);
        assert!(!sync.cache().is_task_pending(task.id));
        // already done: nothing to send
        assert!(sync.complete(&after).is_none());
        assert!(!sync.cache().has_pending_mutations());
    }

    #[tokio::test]
    async fn deleting_removes_the_task() {
        let api = Arc::new(InMemoryTodoApi::default());
        let keep = api.seed(USER, "keep", false).await;
        let gone = api.seed(USER, "gone", false).await;
        let (mut sync, mut events) = sync_with(&api);
        settle(&mut sync, &mut events).await;

        sync.delete(gone.id).unwrap();
        assert!(sync.cache().is_task_pending(gone.id));
        assert!(!sync.cache().is_task_pending(keep.id));

        let event = events.recv().await.unwrap();
        sync.apply(event);
        settle(&mut sync, &mut events).await;

        assert_eq!(names(&sync), vec!["keep"]);
        assert_eq!(sync.cache().last_mutation_error(), None);
    }

    #[tokio::test]
    async fn deleting_an_unknown_id_leaves_the_list_unchanged() {
        let api = Arc::new(InMemoryTodoApi::default());
        api.seed(USER, "keep", false).await;
        let (mut sync, mut events) = sync_with(&api);
        settle(&mut sync, &mut events).await;

        sync.delete(TaskId(404)).unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, SyncEvent::Settled { result: Err(_), .. }));
        sync.apply(event);
        settle(&mut sync, &mut events).await;

        assert_eq!(names(&sync), vec!["keep"]);
        assert!(sync.cache().last_mutation_error().is_some());
        assert!(!sync.cache().is_task_pending(TaskId(404)));
    }

    #[tokio::test]
    async fn failed_list_is_reported_not_emptied() {
        let api = Arc::new(InMemoryTodoApi::default());
        api.fail_lists(true).await;
        let (mut sync, mut events) = sync_with(&api);
        settle(&mut sync, &mut events).await;

        let snapshot = sync.cache().read(&sync.list_key());
        assert_eq!(snapshot.data, None);
        assert!(snapshot.error.unwrap().contains("500"));

        api.fail_lists(false).await;
        sync.refresh();
        settle(&mut sync, &mut events).await;
        assert_eq!(sync.cache().read(&sync.list_key()).error, None);
    }

    #[tokio::test]
    async fn completed_filter_is_part_of_the_query() {
        let api = Arc::new(InMemoryTodoApi::default());
        api.seed(USER, "open", false).await;
        api.seed(USER, "done", true).await;
        let (mut sync, mut events) = TodoSync::new(api.clone(), USER, Some(true));
        settle(&mut sync, &mut events).await;

        assert_eq!(sync.list_key(), QueryKey::todos(USER, Some(true)));
        assert_eq!(names(&sync), vec!["done"]);
    }
}
