use uuid::Uuid;

// Identity is always passed explicitly, never read from ambient state.
#[derive(Debug, Clone)]
pub struct OwnerContext {
    pub owner_id: Uuid,
    pub email: Option<String>,
}

impl OwnerContext {
    pub fn new(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            email: None,
        }
    }

    pub fn with_email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }
}
