use serde::{Deserialize, Serialize};

pub use crate::types::ProfileRole;
use crate::gateway::{Gateway, GatewayError, Table};

/// Read-only projection of an authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub role: ProfileRole,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == ProfileRole::Admin
    }

    pub async fn find_all<G: Gateway + ?Sized>(gateway: &G) -> Result<Vec<Self>, GatewayError> {
        let rows = gateway.select(Table::Profiles, None).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(GatewayError::from))
            .collect()
    }
}
