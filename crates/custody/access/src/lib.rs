//! Custody Access - Role assignment and capability gating
//!
//! Maps identities to roles and gates every sensitive capability through a
//! single authoritative table. Assignment requires the secret configured for
//! the target role; failures leave state unchanged and write no audit entry.

#![deny(unsafe_code)]

use async_trait::async_trait;
use custody_audit::{AuditError, AuditLog};
use custody_types::{ActionType, AuditEntry, PartyId, Role};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::info;

/// Capabilities gated by role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    Upload,
    Transfer,
    Verify,
    ManageUsers,
    ViewAudit,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Upload => "upload",
            Self::Transfer => "transfer",
            Self::Verify => "verify",
            Self::ManageUsers => "manage users",
            Self::ViewAudit => "view audit",
        };
        f.write_str(name)
    }
}

/// The authoritative capability table. All gating decisions consult this
/// function; no component compares role names directly.
pub fn role_allows(role: Role, capability: Capability) -> bool {
    match (role, capability) {
        (Role::Investigator, Capability::Upload) => true,
        (Role::Investigator, Capability::Transfer) => true,
        (Role::Investigator, Capability::Verify) => true,
        (Role::Investigator, Capability::ManageUsers) => false,
        (Role::Investigator, Capability::ViewAudit) => false,

        (Role::Admin, Capability::Upload) => true,
        (Role::Admin, Capability::Transfer) => false,
        (Role::Admin, Capability::Verify) => true,
        (Role::Admin, Capability::ManageUsers) => true,
        (Role::Admin, Capability::ViewAudit) => true,

        (Role::Auditor, Capability::Upload) => false,
        (Role::Auditor, Capability::Transfer) => false,
        (Role::Auditor, Capability::Verify) => true,
        (Role::Auditor, Capability::ManageUsers) => false,
        (Role::Auditor, Capability::ViewAudit) => true,
    }
}

/// Secrets required to assume each role.
///
/// Defaults are development fallbacks matching a fresh deployment; real
/// deployments supply their own values.
#[derive(Clone, Debug)]
pub struct AccessConfig {
    pub investigator_secret: String,
    pub admin_secret: String,
    pub auditor_secret: String,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            investigator_secret: "investigator123".to_string(),
            admin_secret: "admin123".to_string(),
            auditor_secret: "auditor123".to_string(),
        }
    }
}

impl AccessConfig {
    fn secret_for(&self, role: Role) -> &str {
        match role {
            Role::Investigator => &self.investigator_secret,
            Role::Admin => &self.admin_secret,
            Role::Auditor => &self.auditor_secret,
        }
    }
}

/// Storage backend for the role map. The persisted document is a JSON
/// object `identity -> role`.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn load(&self) -> Result<HashMap<PartyId, Role>, AccessError>;
    async fn save(&self, roles: &HashMap<PartyId, Role>) -> Result<(), AccessError>;
}

/// In-memory role store for tests and ephemeral sessions.
pub struct MemoryRoleStore {
    roles: RwLock<HashMap<PartyId, Role>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRoleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn load(&self) -> Result<HashMap<PartyId, Role>, AccessError> {
        let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
        Ok(roles.clone())
    }

    async fn save(&self, roles: &HashMap<PartyId, Role>) -> Result<(), AccessError> {
        let mut stored = self.roles.write().map_err(|_| AccessError::LockError)?;
        *stored = roles.clone();
        Ok(())
    }
}

/// File-backed role store, one JSON object document.
pub struct JsonFileRoleStore {
    path: PathBuf,
}

impl JsonFileRoleStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl RoleStore for JsonFileRoleStore {
    async fn load(&self) -> Result<HashMap<PartyId, Role>, AccessError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let text = tokio::fs::read_to_string(&self.path).await?;
        if text.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn save(&self, roles: &HashMap<PartyId, Role>) -> Result<(), AccessError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string(roles)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// Gates capabilities and manages the identity -> role mapping.
pub struct AccessController {
    roles: RwLock<HashMap<PartyId, Role>>,
    store: Arc<dyn RoleStore>,
    config: AccessConfig,
    audit: Arc<AuditLog>,
}

impl AccessController {
    /// Open the controller, loading any previously persisted role map.
    pub async fn open(
        config: AccessConfig,
        store: Arc<dyn RoleStore>,
        audit: Arc<AuditLog>,
    ) -> Result<Self, AccessError> {
        let roles = store.load().await?;
        Ok(Self {
            roles: RwLock::new(roles),
            store,
            config,
            audit,
        })
    }

    /// Current role of an identity, if any.
    pub fn role_of(&self, identity: &PartyId) -> Result<Option<Role>, AccessError> {
        let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
        Ok(roles.get(identity).copied())
    }

    /// Snapshot of the full role map.
    pub fn roles(&self) -> Result<HashMap<PartyId, Role>, AccessError> {
        let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
        Ok(roles.clone())
    }

    /// Check that an identity's role grants a capability.
    pub fn require(&self, identity: &PartyId, capability: Capability) -> Result<Role, AccessError> {
        let role = self
            .role_of(identity)?
            .ok_or_else(|| AccessError::Unassigned(identity.to_string()))?;
        if role_allows(role, capability) {
            Ok(role)
        } else {
            Err(AccessError::CapabilityDenied { role, capability })
        }
    }

    /// Assign (or reassign) a role to an identity. The secret must match
    /// the configured secret for the TARGET role; on failure the mapping is
    /// unchanged and nothing is audited.
    pub async fn assign_role(
        &self,
        identity: &PartyId,
        selected: Option<Role>,
        secret: &str,
    ) -> Result<Role, AccessError> {
        let role = selected.ok_or(AccessError::NoRoleSelected)?;
        if secret != self.config.secret_for(role) {
            return Err(AccessError::IncorrectSecret(role));
        }

        let previous = self.commit_role(identity.clone(), role).await?;
        info!(identity = %identity, role = %role, "role assigned");

        let entry = match previous {
            Some(prev) if prev != role => AuditEntry::new(
                identity.clone(),
                format!("Changed role from {prev} to {role}"),
                ActionType::RoleChange,
            ),
            _ => AuditEntry::new(
                identity.clone(),
                format!("Assigned role: {role}"),
                ActionType::RoleAssignment,
            ),
        }
        .with_role(Some(role));
        self.audit.append(entry).await?;

        Ok(role)
    }

    /// Register a new identity with a role. Requires the ManageUsers
    /// capability; rejects identities that already exist.
    pub async fn create_user(
        &self,
        actor: &PartyId,
        identity: PartyId,
        role: Role,
    ) -> Result<(), AccessError> {
        let actor_role = self.require(actor, Capability::ManageUsers)?;

        {
            let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
            if roles.contains_key(&identity) {
                return Err(AccessError::AlreadyExists(identity.to_string()));
            }
        }

        self.commit_role(identity.clone(), role).await?;

        let entry = AuditEntry::new(
            actor.clone(),
            format!("Created new user: {} with role {role}", identity.short()),
            ActionType::UserCreated,
        )
        .with_role(Some(actor_role));
        self.audit.append(entry).await?;

        Ok(())
    }

    /// Change another identity's role. Requires the ManageUsers capability;
    /// last write wins, no conflict detection.
    pub async fn change_role(
        &self,
        actor: &PartyId,
        identity: &PartyId,
        role: Role,
    ) -> Result<(), AccessError> {
        let actor_role = self.require(actor, Capability::ManageUsers)?;

        {
            let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
            if !roles.contains_key(identity) {
                return Err(AccessError::UnknownIdentity(identity.to_string()));
            }
        }

        self.commit_role(identity.clone(), role).await?;

        let entry = AuditEntry::new(
            actor.clone(),
            format!("Changed {} role to {role}", identity.short()),
            ActionType::RoleChange,
        )
        .with_role(Some(actor_role));
        self.audit.append(entry).await?;

        Ok(())
    }

    /// Write-through commit of one mapping; returns the previous role.
    async fn commit_role(
        &self,
        identity: PartyId,
        role: Role,
    ) -> Result<Option<Role>, AccessError> {
        let (snapshot, previous) = {
            let roles = self.roles.read().map_err(|_| AccessError::LockError)?;
            let mut next = roles.clone();
            let previous = next.insert(identity, role);
            (next, previous)
        };

        self.store.save(&snapshot).await?;

        let mut roles = self.roles.write().map_err(|_| AccessError::LockError)?;
        *roles = snapshot;
        Ok(previous)
    }
}

/// Access-control errors.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("no role selected")]
    NoRoleSelected,

    #[error("incorrect secret for role {0}")]
    IncorrectSecret(Role),

    #[error("identity {0} has no assigned role")]
    Unassigned(String),

    #[error("role {role} may not {capability}")]
    CapabilityDenied { role: Role, capability: Capability },

    #[error("identity {0} already exists")]
    AlreadyExists(String),

    #[error("identity {0} is not registered")]
    UnknownIdentity(String),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error("role store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("role store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("lock error")]
    LockError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_audit::MemoryAuditStore;

    async fn controller() -> AccessController {
        let audit = Arc::new(
            AuditLog::open(Arc::new(MemoryAuditStore::new()))
                .await
                .unwrap(),
        );
        AccessController::open(AccessConfig::default(), Arc::new(MemoryRoleStore::new()), audit)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_wrong_secret_leaves_state_unchanged() {
        let ctl = controller().await;
        let alice = PartyId::new("0xalice");

        let err = ctl
            .assign_role(&alice, Some(Role::Auditor), "wrong")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::IncorrectSecret(Role::Auditor)));
        assert_eq!(ctl.role_of(&alice).unwrap(), None);
        assert!(ctl.audit.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_no_role_selected() {
        let ctl = controller().await;
        let err = ctl
            .assign_role(&PartyId::new("0xalice"), None, "whatever")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::NoRoleSelected));
    }

    #[tokio::test]
    async fn test_assignment_then_idempotent_reassignment() {
        let ctl = controller().await;
        let alice = PartyId::new("0xalice");

        ctl.assign_role(&alice, Some(Role::Investigator), "investigator123")
            .await
            .unwrap();
        ctl.assign_role(&alice, Some(Role::Investigator), "investigator123")
            .await
            .unwrap();

        assert_eq!(ctl.role_of(&alice).unwrap(), Some(Role::Investigator));
        // One entry per successful call.
        let all = ctl.audit.all().unwrap();
        assert_eq!(all.len(), 2);
        assert!(all
            .iter()
            .all(|e| e.action_type == ActionType::RoleAssignment));
    }

    #[tokio::test]
    async fn test_reassignment_to_new_role_requires_target_secret() {
        let ctl = controller().await;
        let alice = PartyId::new("0xalice");

        ctl.assign_role(&alice, Some(Role::Investigator), "investigator123")
            .await
            .unwrap();

        // The current role's secret does not unlock the target role.
        let err = ctl
            .assign_role(&alice, Some(Role::Admin), "investigator123")
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::IncorrectSecret(Role::Admin)));
        assert_eq!(ctl.role_of(&alice).unwrap(), Some(Role::Investigator));

        ctl.assign_role(&alice, Some(Role::Admin), "admin123")
            .await
            .unwrap();
        assert_eq!(ctl.role_of(&alice).unwrap(), Some(Role::Admin));
        assert_eq!(
            ctl.audit.all().unwrap()[0].action_type,
            ActionType::RoleChange
        );
    }

    #[tokio::test]
    async fn test_capability_table() {
        assert!(role_allows(Role::Investigator, Capability::Upload));
        assert!(role_allows(Role::Investigator, Capability::Transfer));
        assert!(!role_allows(Role::Investigator, Capability::ViewAudit));

        assert!(role_allows(Role::Admin, Capability::Upload));
        assert!(!role_allows(Role::Admin, Capability::Transfer));
        assert!(role_allows(Role::Admin, Capability::ManageUsers));

        assert!(!role_allows(Role::Auditor, Capability::Upload));
        assert!(role_allows(Role::Auditor, Capability::Verify));
        assert!(role_allows(Role::Auditor, Capability::ViewAudit));
    }

    #[tokio::test]
    async fn test_create_user_requires_admin() {
        let ctl = controller().await;
        let admin = PartyId::new("0xadmin");
        let alice = PartyId::new("0xalice");

        ctl.assign_role(&admin, Some(Role::Admin), "admin123")
            .await
            .unwrap();
        ctl.create_user(&admin, alice.clone(), Role::Investigator)
            .await
            .unwrap();
        assert_eq!(ctl.role_of(&alice).unwrap(), Some(Role::Investigator));

        let err = ctl
            .create_user(&admin, alice.clone(), Role::Auditor)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::AlreadyExists(_)));

        // Investigators hold no user-admin capability.
        let err = ctl
            .create_user(&alice, PartyId::new("0xbob"), Role::Auditor)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::CapabilityDenied { .. }));
    }

    #[tokio::test]
    async fn test_change_role_audits_role_change() {
        let ctl = controller().await;
        let admin = PartyId::new("0xadmin");
        let alice = PartyId::new("0xalice");

        ctl.assign_role(&admin, Some(Role::Admin), "admin123")
            .await
            .unwrap();
        ctl.create_user(&admin, alice.clone(), Role::Investigator)
            .await
            .unwrap();
        ctl.change_role(&admin, &alice, Role::Auditor).await.unwrap();

        assert_eq!(ctl.role_of(&alice).unwrap(), Some(Role::Auditor));
        assert_eq!(
            ctl.audit.all().unwrap()[0].action_type,
            ActionType::RoleChange
        );
    }

    #[tokio::test]
    async fn test_file_role_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roles.json");
        let audit = Arc::new(
            AuditLog::open(Arc::new(MemoryAuditStore::new()))
                .await
                .unwrap(),
        );

        {
            let ctl = AccessController::open(
                AccessConfig::default(),
                Arc::new(JsonFileRoleStore::new(path.clone())),
                audit.clone(),
            )
            .await
            .unwrap();
            ctl.assign_role(&PartyId::new("0xalice"), Some(Role::Auditor), "auditor123")
                .await
                .unwrap();
        }

        let ctl = AccessController::open(
            AccessConfig::default(),
            Arc::new(JsonFileRoleStore::new(path)),
            audit,
        )
        .await
        .unwrap();
        assert_eq!(
            ctl.role_of(&PartyId::new("0xalice")).unwrap(),
            Some(Role::Auditor)
        );
    }
}
