use crate::AuthzError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Manage,
}

impl Action {
    /// Concrete actions implied by [`Action::Manage`].
    pub const CONCRETE: [Action; 4] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Manage => "manage",
        }
    }

    /// Actions a grant of `self` is indexed under.
    ///
    /// `Manage` keeps its own entry so an explicit `manage` check still finds it.
    pub fn implied(self) -> &'static [Action] {
        match self {
            Action::Create => &[Action::Create],
            Action::Read => &[Action::Read],
            Action::Update => &[Action::Update],
            Action::Delete => &[Action::Delete],
            Action::Manage => &[
                Action::Create,
                Action::Read,
                Action::Update,
                Action::Delete,
                Action::Manage,
            ],
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = AuthzError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // Catalog rows are written by hand often enough that `Update` and
        // ` update ` must both parse.
        match value.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            "manage" => Ok(Action::Manage),
            _ => Err(AuthzError::InvalidAction(value.to_string())),
        }
    }
}
