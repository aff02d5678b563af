//! In-memory query cache and mutation registry.
//!
//! Query results are keyed by what was asked (whose tasks, which filter).
//! Each fetch is stamped with a generation; only the result of the newest
//! fetch for a key is ever stored, so a slow response can never overwrite a
//! newer one. Mutations stay registered from the moment they start until the
//! list refetch that follows their settle has landed, which is what keeps a
//! provisional entry or a disabled row on screen for exactly that long.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::app::models::{NewTask, Task, TaskId, TaskPatch, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Todos { user: UserId, completed: Option<bool> },
}

impl QueryKey {
    pub fn todos(user: UserId, completed: Option<bool>) -> Self {
        QueryKey::Todos { user, completed }
    }

    fn user(&self) -> UserId {
        match self {
            QueryKey::Todos { user, .. } => *user,
        }
    }
}

#[derive(Debug, Default)]
struct QueryState {
    data: Option<Vec<Task>>,
    error: Option<String>,
    in_flight: Option<u64>,
    stale: bool,
    updated_at: Option<DateTime<Utc>>,
}

// Read-only view of one query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuerySnapshot<'a> {
    pub data: Option<&'a [Task]>,
    pub error: Option<&'a str>,
    pub is_fetching: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

// Input of a mutation, kept around while it is in flight
#[derive(Debug, Clone, PartialEq)]
pub enum MutationVariables {
    Create { user: UserId, todo: NewTask },
    Update { id: TaskId, patch: TaskPatch },
    Delete { id: TaskId },
}

impl MutationVariables {
    pub fn kind(&self) -> MutationKind {
        match self {
            MutationVariables::Create { .. } => MutationKind::Create,
            MutationVariables::Update { .. } => MutationKind::Update,
            MutationVariables::Delete { .. } => MutationKind::Delete,
        }
    }

    fn target(&self) -> Option<TaskId> {
        match self {
            MutationVariables::Create { .. } => None,
            MutationVariables::Update { id, .. } | MutationVariables::Delete { id } => Some(*id),
        }
    }

    // A create only touches its own user's lists; ids carry no user, so
    // updates and deletes refresh every list.
    fn affects(&self, key: &QueryKey) -> bool {
        match self {
            MutationVariables::Create { user, .. } => key.user() == *user,
            _ => true,
        }
    }
}

#[derive(Debug)]
struct PendingMutation {
    variables: MutationVariables,
    // Set on settle: the first fetch generation that can release this mutation
    released_by: Option<u64>,
}

#[derive(Debug, Default)]
pub struct QueryCache {
    queries: HashMap<QueryKey, QueryState>,
    mutations: BTreeMap<MutationId, PendingMutation>,
    next_generation: u64,
    next_mutation: u64,
    last_mutation_error: Option<String>,
}

impl QueryCache {
    pub fn new() -> Self {
        QueryCache::default()
    }

    pub fn read(&self, key: &QueryKey) -> QuerySnapshot<'_> {
        match self.queries.get(key) {
            Some(state) => QuerySnapshot {
                data: state.data.as_deref(),
                error: state.error.as_deref(),
                is_fetching: state.in_flight.is_some(),
                updated_at: state.updated_at,
            },
            None => QuerySnapshot {
                data: None,
                error: None,
                is_fetching: false,
                updated_at: None,
            },
        }
    }

    // True when a read of this key should start a fetch
    pub fn needs_fetch(&self, key: &QueryKey) -> bool {
        match self.queries.get(key) {
            None => true,
            Some(state) => {
                let never_loaded = state.data.is_none() && state.error.is_none();
                state.in_flight.is_none() && (state.stale || never_loaded)
            }
        }
    }

    /// Registers a fetch for `key` and returns its generation.
    ///
    /// Starting a fetch supersedes any fetch already in flight for the key.
    pub fn begin_fetch(&mut self, key: QueryKey) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;

        let state = self.queries.entry(key).or_default();
        state.in_flight = Some(generation);
        state.stale = false;
        debug!(?key, generation, "fetch started");
        generation
    }

    /// Stores the outcome of a fetch. Returns `false` when the generation was
    /// superseded and the result was dropped.
    pub fn complete_fetch(
        &mut self,
        key: QueryKey,
        generation: u64,
        result: Result<Vec<Task>, String>,
    ) -> bool {
        let Some(state) = self.queries.get_mut(&key) else {
            return false;
        };
        if state.in_flight != Some(generation) {
            debug!(?key, generation, "dropping superseded fetch result");
            return false;
        }

        state.in_flight = None;
        match result {
            Ok(tasks) => {
                state.data = Some(tasks);
                state.error = None;
                state.updated_at = Some(Utc::now());
            }
            // Previously loaded data survives a failed refetch
            Err(message) => state.error = Some(message),
        }

        self.mutations.retain(|_, mutation| {
            let released = mutation.released_by.is_some_and(|first| first <= generation)
                && mutation.variables.affects(&key);
            !released
        });
        true
    }

    // Marks every list of this user stale and cancels fetches in flight for them
    pub fn invalidate_user(&mut self, user: UserId) -> Vec<QueryKey> {
        self.invalidate_where(|key| key.user() == user)
    }

    fn invalidate_where(&mut self, matches: impl Fn(&QueryKey) -> bool) -> Vec<QueryKey> {
        let mut invalidated = Vec::new();
        for (key, state) in self.queries.iter_mut().filter(|(key, _)| matches(*key)) {
            state.stale = true;
            state.in_flight = None;
            invalidated.push(*key);
        }
        if !invalidated.is_empty() {
            debug!(?invalidated, "queries invalidated");
        }
        invalidated
    }

    pub fn begin_mutation(&mut self, variables: MutationVariables) -> MutationId {
        let id = MutationId(self.next_mutation);
        self.next_mutation += 1;
        debug!(?id, kind = ?variables.kind(), "mutation started");
        self.mutations.insert(
            id,
            PendingMutation {
                variables,
                released_by: None,
            },
        );
        id
    }

    /// Records the outcome of a mutation and invalidates the lists it touches.
    ///
    /// The mutation keeps counting as pending until one of those lists has
    /// been refetched. If nothing is cached that it affects, it is dropped
    /// right away.
    pub fn settle_mutation(
        &mut self,
        id: MutationId,
        outcome: Result<(), String>,
    ) -> Vec<QueryKey> {
        match outcome {
            Ok(()) => self.last_mutation_error = None,
            Err(message) => self.last_mutation_error = Some(message),
        }

        let Some(mutation) = self.mutations.get_mut(&id) else {
            return Vec::new();
        };
        mutation.released_by = Some(self.next_generation);
        let variables = mutation.variables.clone();

        let invalidated = self.invalidate_where(|key| variables.affects(key));
        if invalidated.is_empty() {
            self.mutations.remove(&id);
        }
        invalidated
    }

    // Names of in-flight creations, oldest first
    pub fn pending_creations(&self) -> Vec<&str> {
        self.mutations
            .values()
            .filter_map(|mutation| match &mutation.variables {
                MutationVariables::Create { todo, .. } => Some(todo.name.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn is_task_pending(&self, id: TaskId) -> bool {
        self.mutations
            .values()
            .any(|mutation| mutation.variables.target() == Some(id))
    }

    pub fn pending_count(&self, kind: MutationKind) -> usize {
        self.mutations
            .values()
            .filter(|mutation| mutation.variables.kind() == kind)
            .count()
    }

    pub fn has_pending_mutations(&self) -> bool {
        !self.mutations.is_empty()
    }

    pub fn last_mutation_error(&self) -> Option<&str> {
        self.last_mutation_error.as_deref()
    }
}
