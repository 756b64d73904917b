//! In-memory storage, used when no `DATABASE_URL` is configured and in tests

use super::store::{StoreError, StoreResult, TaskStore, UserStore};
use crate::models::{NewTask, NewUser, Profile, Task, TaskFilter, TaskPatch, User};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    profiles: HashMap<Uuid, Profile>,
    verifications: HashMap<Uuid, Uuid>,
    tokens: HashMap<String, Uuid>,
    tasks: BTreeMap<i64, Task>,
    next_task_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.username == new_user.username) {
            return Err(StoreError::Conflict("username"));
        }
        if state.users.values().any(|u| u.email == new_user.email) {
            return Err(StoreError::Conflict("email"));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            password_hash: new_user.password_hash,
            created_at: Utc::now(),
        };
        state
            .profiles
            .insert(user.id, Profile::new(user.id, new_user.agreement_accepted));
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn set_password_hash(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        if let Some(user) = self.state.write().await.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn update_names(&self, user_id: Uuid, first_name: &str, last_name: &str) -> StoreResult<()> {
        if let Some(user) = self.state.write().await.users.get_mut(&user_id) {
            user.first_name = first_name.to_string();
            user.last_name = last_name.to_string();
        }
        Ok(())
    }

    async fn change_email(&self, user_id: Uuid, email: &str) -> StoreResult<()> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == email && u.id != user_id) {
            return Err(StoreError::Conflict("email"));
        }
        if let Some(user) = state.users.get_mut(&user_id) {
            user.email = email.to_string();
        }
        if let Some(profile) = state.profiles.get_mut(&user_id) {
            profile.email_verified = false;
        }
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.state.read().await.profiles.get(&user_id).cloned())
    }

    async fn save_profile(&self, profile: &Profile) -> StoreResult<()> {
        self.state
            .write()
            .await
            .profiles
            .insert(profile.user_id, profile.clone());
        Ok(())
    }

    async fn create_email_verification(&self, user_id: Uuid) -> StoreResult<Uuid> {
        let token = Uuid::new_v4();
        self.state.write().await.verifications.insert(token, user_id);
        Ok(token)
    }

    async fn consume_email_verification(&self, token: Uuid) -> StoreResult<Option<Uuid>> {
        let mut state = self.state.write().await;
        let Some(user_id) = state.verifications.remove(&token) else {
            return Ok(None);
        };
        if let Some(profile) = state.profiles.get_mut(&user_id) {
            profile.email_verified = true;
        }
        Ok(Some(user_id))
    }

    async fn create_auth_token(&self, user_id: Uuid, token_hash: &str) -> StoreResult<()> {
        self.state
            .write()
            .await
            .tokens
            .insert(token_hash.to_string(), user_id);
        Ok(())
    }

    async fn find_user_by_token(&self, token_hash: &str) -> StoreResult<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .tokens
            .get(token_hash)
            .and_then(|user_id| state.users.get(user_id))
            .cloned())
    }

    async fn revoke_auth_token(&self, token_hash: &str) -> StoreResult<()> {
        self.state.write().await.tokens.remove(token_hash);
        Ok(())
    }

    async fn revoke_user_tokens(&self, user_id: Uuid) -> StoreResult<()> {
        self.state
            .write()
            .await
            .tokens
            .retain(|_, owner| *owner != user_id);
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn list_tasks(&self, user_id: Uuid, filter: TaskFilter) -> StoreResult<Vec<Task>> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .values()
            .filter(|t| t.user_id == user_id && filter.matches(t))
            .cloned()
            .collect())
    }

    async fn create_task(&self, user_id: Uuid, new_task: NewTask) -> StoreResult<Task> {
        let mut state = self.state.write().await;
        state.next_task_id += 1;
        let task = Task {
            id: state.next_task_id,
            user_id,
            name: new_task.name,
            description: new_task.description,
            created_at: Utc::now(),
            complete: false,
        };
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, user_id: Uuid, task_id: i64) -> StoreResult<Option<Task>> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .get(&task_id)
            .filter(|t| t.user_id == user_id)
            .cloned())
    }

    async fn update_task(&self, user_id: Uuid, task_id: i64, patch: TaskPatch) -> StoreResult<Option<Task>> {
        let mut state = self.state.write().await;
        let Some(task) = state.tasks.get_mut(&task_id).filter(|t| t.user_id == user_id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            task.name = name;
        }
        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(complete) = patch.complete {
            task.complete = complete;
        }
        Ok(Some(task.clone()))
    }

    async fn delete_task(&self, user_id: Uuid, task_id: i64) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let owned = state.tasks.get(&task_id).is_some_and(|t| t.user_id == user_id);
        if owned {
            state.tasks.remove(&task_id);
        }
        Ok(owned)
    }

    async fn delete_completed_tasks(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut state = self.state.write().await;
        let before = state.tasks.len();
        state
            .tasks
            .retain(|_, t| !(t.user_id == user_id && t.complete));
        Ok((before - state.tasks.len()) as u64)
    }
}
