use serde::Serialize;

use crate::users::repo_types::User;

/// Body of `GET /`.
#[derive(Debug, Serialize)]
pub struct VisitResponse {
    pub hostname: String,
    pub message: &'static str,
    pub new_user: User,
    pub total_users: usize,
    pub all_users: Vec<User>,
}
