use serde::{Deserialize, Serialize};

use gallery_core::{SessionId, UserId};

use crate::model::CartOwner;

/// Per-request identity supplied by the session layer (never persisted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityContext {
    pub session_id: SessionId,
    pub user_id: Option<UserId>,
}

impl IdentityContext {
    pub fn guest(session_id: SessionId) -> Self {
        Self {
            session_id,
            user_id: None,
        }
    }

    pub fn authenticated(session_id: SessionId, user_id: UserId) -> Self {
        Self {
            session_id,
            user_id: Some(user_id),
        }
    }

    /// Owner a newly created cart gets for this identity.
    pub fn preferred_owner(&self) -> CartOwner {
        match self.user_id {
            Some(user_id) => CartOwner::User(user_id),
            None => CartOwner::Session(self.session_id.clone()),
        }
    }
}

/// Login notification from the authentication flow.
///
/// `old_session_id` must be captured before the session id is rotated: the
/// guest cart is only reachable through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginEvent {
    pub old_session_id: SessionId,
    pub new_session_id: SessionId,
    pub user_id: UserId,
}

impl LoginEvent {
    pub fn pre_rotation_identity(&self) -> IdentityContext {
        IdentityContext::authenticated(self.old_session_id.clone(), self.user_id)
    }

    pub fn post_rotation_identity(&self) -> IdentityContext {
        IdentityContext::authenticated(self.new_session_id.clone(), self.user_id)
    }

    pub fn rotated(&self) -> bool {
        self.old_session_id != self.new_session_id
    }
}
