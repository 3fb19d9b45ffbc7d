//! Account collaborator: credential checks, profile defaults, the violation
//! counter and the ban list.
//!
//! The relay core only talks to `AccountDirectory`. `MemoryAccounts` is the
//! in-process implementation used by the binary, seeded from a JSON file.

use crate::error::{AccountError, AuthError};
use crate::i18n::Language;
use crate::session::{Identity, Profile};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

/// Violation counter after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagOutcome {
    pub count: u32,
    /// The account is banned as of this increment
    pub banned_now: bool,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;

    /// Language preference and avatar, created with defaults on first use.
    async fn profile(&self, identity: &Identity) -> Profile;

    async fn flag_count(&self, identity: &Identity) -> Result<u32, AccountError>;

    async fn increment_flag(&self, identity: &Identity) -> Result<FlagOutcome, AccountError>;

    async fn is_banned(&self, identity: &Identity) -> bool;
}

/// Stable generated avatar for accounts that never uploaded one.
pub fn default_avatar(user_id: &str) -> String {
    format!("https://robohash.org/{}.png?size=80x80&set=set1", user_id)
}

/// Constant-time comparison so token lookups do not leak prefix matches
fn token_matches(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// One account in the seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountSeed {
    pub user_id: String,
    pub email: String,
    pub token: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub flags: u32,
}

#[derive(Debug, Default, Deserialize)]
struct SeedFile {
    #[serde(default)]
    accounts: Vec<AccountSeed>,
    /// Banned emails
    #[serde(default)]
    banned: Vec<String>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    accounts: Vec<AccountSeed>,
    flags: HashMap<String, u32>,
    banned: HashSet<String>,
}

impl DirectoryState {
    fn account_mut(&mut self, user_id: &str) -> Option<&mut AccountSeed> {
        self.accounts.iter_mut().find(|a| a.user_id == user_id)
    }
}

pub struct MemoryAccounts {
    state: Mutex<DirectoryState>,
    ban_threshold: u32,
}

impl MemoryAccounts {
    pub fn new(ban_threshold: u32) -> Self {
        Self {
            state: Mutex::new(DirectoryState::default()),
            ban_threshold: ban_threshold.max(1),
        }
    }

    /// Load accounts and bans from a JSON file:
    /// `{"accounts": [{"user_id", "email", "token", "language"?, "avatar_url"?, "flags"?}], "banned": ["email"]}`
    pub fn from_file(path: impl AsRef<Path>, ban_threshold: u32) -> Result<Self, AccountError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let seed: SeedFile = serde_json::from_str(&content)?;

        let directory = Self::new(ban_threshold);
        for email in &seed.banned {
            directory.ban_email(email);
        }
        let count = seed.accounts.len();
        for account in seed.accounts {
            directory.add_account(account);
        }

        info!(
            "Loaded {} accounts and {} bans from {}",
            count,
            seed.banned.len(),
            path.as_ref().display()
        );
        Ok(directory)
    }

    pub fn add_account(&self, account: AccountSeed) {
        let mut state = self.lock();
        if account.flags > 0 {
            state.flags.insert(account.user_id.clone(), account.flags);
        }
        state.accounts.retain(|a| a.user_id != account.user_id);
        state.accounts.push(account);
    }

    pub fn ban_email(&self, email: &str) {
        self.lock().banned.insert(email.trim().to_lowercase());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DirectoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccounts {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let state = self.lock();

        let account = state
            .accounts
            .iter()
            .find(|a| token_matches(&a.token, token))
            .ok_or(AuthError::InvalidCredential)?;

        if state.banned.contains(&account.email.to_lowercase()) {
            return Err(AuthError::Banned);
        }

        Ok(Identity {
            user_id: account.user_id.clone(),
            email: account.email.clone(),
        })
    }

    async fn profile(&self, identity: &Identity) -> Profile {
        let mut state = self.lock();
        let Some(account) = state.account_mut(&identity.user_id) else {
            return Profile::default();
        };

        let language = account
            .language
            .get_or_insert_with(|| Language::default_language().code().to_string())
            .clone();
        let avatar = account
            .avatar_url
            .get_or_insert_with(|| default_avatar(&identity.user_id))
            .clone();

        Profile {
            language,
            avatar: Some(avatar),
        }
    }

    async fn flag_count(&self, identity: &Identity) -> Result<u32, AccountError> {
        let state = self.lock();
        if !state.accounts.iter().any(|a| a.user_id == identity.user_id) {
            return Err(AccountError::UnknownIdentity(identity.user_id.clone()));
        }
        Ok(state.flags.get(&identity.user_id).copied().unwrap_or(0))
    }

    async fn increment_flag(&self, identity: &Identity) -> Result<FlagOutcome, AccountError> {
        let mut state = self.lock();
        if !state.accounts.iter().any(|a| a.user_id == identity.user_id) {
            return Err(AccountError::UnknownIdentity(identity.user_id.clone()));
        }

        let count = {
            let entry = state.flags.entry(identity.user_id.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        let banned_now = count >= self.ban_threshold;
        if banned_now {
            state.banned.insert(identity.email.to_lowercase());
            warn!(
                "Account {} banned after {} moderation flags",
                identity.email, count
            );
        }

        Ok(FlagOutcome { count, banned_now })
    }

    async fn is_banned(&self, identity: &Identity) -> bool {
        self.lock().banned.contains(&identity.email.to_lowercase())
    }
}
