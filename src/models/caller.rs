use uuid::Uuid;

/// Who is making a request, as established by the auth middleware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<Uuid>,
    /// Admins may create, edit and delete global models.
    pub is_admin: bool,
}

impl Caller {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            is_admin: false,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn admin(user_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }
}
