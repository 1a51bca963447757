use serde::{Deserialize, Serialize};

/// A login attempt. The ID is raw user input and is validated on use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub voter_id: String,
}

#[cfg(test)]
mod examples {
    use super::*;

    impl LoginRequest {
        pub fn example() -> Self {
            Self {
                voter_id: "A123".to_string(),
            }
        }

        pub fn admin_example() -> Self {
            Self {
                voter_id: "ADM001".to_string(),
            }
        }
    }
}
