//! Static role-to-capability table.
//!
//! Pure lookups, no I/O. Role grants are strictly nested:
//! owner ⊇ admin ⊇ member.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Owner,
    Admin,
    Member,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Owner => "owner",
            MembershipRole::Admin => "admin",
            MembershipRole::Member => "member",
        }
    }
}

impl std::fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "org:read")]
    OrgRead,
    #[serde(rename = "org:settings.manage")]
    OrgSettingsManage,
    #[serde(rename = "org:members.manage")]
    OrgMembersManage,
    #[serde(rename = "org:billing.manage")]
    OrgBillingManage,
    #[serde(rename = "org:config.manage")]
    OrgConfigManage,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::OrgRead => "org:read",
            Capability::OrgSettingsManage => "org:settings.manage",
            Capability::OrgMembersManage => "org:members.manage",
            Capability::OrgBillingManage => "org:billing.manage",
            Capability::OrgConfigManage => "org:config.manage",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const OWNER_CAPABILITIES: &[Capability] = &[
    Capability::OrgRead,
    Capability::OrgSettingsManage,
    Capability::OrgMembersManage,
    Capability::OrgBillingManage,
    Capability::OrgConfigManage,
];

const ADMIN_CAPABILITIES: &[Capability] = &[
    Capability::OrgRead,
    Capability::OrgSettingsManage,
    Capability::OrgMembersManage,
];

const MEMBER_CAPABILITIES: &[Capability] = &[Capability::OrgRead];

/// Capability set granted to a role.
pub fn capabilities_for(role: MembershipRole) -> &'static [Capability] {
    match role {
        MembershipRole::Owner => OWNER_CAPABILITIES,
        MembershipRole::Admin => ADMIN_CAPABILITIES,
        MembershipRole::Member => MEMBER_CAPABILITIES,
    }
}

pub fn has_capability(role: MembershipRole, capability: Capability) -> bool {
    capabilities_for(role).contains(&capability)
}
