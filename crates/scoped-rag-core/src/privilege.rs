//! Privilege levels and the escalation policy.
//!
//! A store call runs either as the caller (subject to the store's row-level
//! access rules) or elevated (administrative credentials that bypass them).
//! Whether a failed caller-level search may be retried elevated is decided
//! by a [`PrivilegeEscalationPolicy`].

use std::fmt;

use crate::error::StoreError;
use crate::models::ContextRef;

/// The identity a store call runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    /// Honors the caller's access policy.
    Caller,
    /// Administrative access that bypasses row-level policy.
    Elevated,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Privilege::Caller => f.write_str("caller"),
            Privilege::Elevated => f.write_str("elevated"),
        }
    }
}

/// Decides when retrieval may step up from [`Privilege::Caller`].
pub trait PrivilegeEscalationPolicy: Send + Sync {
    /// Called after the caller-level similarity search failed. Returning
    /// `Some` retries the identical search at that privilege; `None` skips
    /// straight to the non-ranked fallback.
    fn escalate(&self, scope: &ContextRef, failure: &StoreError) -> Option<Privilege>;

    /// Privilege used for the non-ranked fallback reads.
    fn fallback_privilege(&self) -> Privilege;

    /// Name as written in `retrieval.escalation`.
    fn name(&self) -> &'static str;
}

/// Any caller-level failure is retried elevated.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysEscalate;

impl PrivilegeEscalationPolicy for AlwaysEscalate {
    fn escalate(&self, _scope: &ContextRef, _failure: &StoreError) -> Option<Privilege> {
        Some(Privilege::Elevated)
    }

    fn fallback_privilege(&self) -> Privilege {
        Privilege::Elevated
    }

    fn name(&self) -> &'static str {
        "always"
    }
}

/// Only access-policy rejections are retried elevated.
#[derive(Debug, Clone, Copy, Default)]
pub struct EscalateOnPolicyRejection;

impl PrivilegeEscalationPolicy for EscalateOnPolicyRejection {
    fn escalate(&self, _scope: &ContextRef, failure: &StoreError) -> Option<Privilege> {
        match failure {
            StoreError::PolicyRejection(_) => Some(Privilege::Elevated),
            _ => None,
        }
    }

    fn fallback_privilege(&self) -> Privilege {
        Privilege::Elevated
    }

    fn name(&self) -> &'static str {
        "policy-rejection"
    }
}

/// Never leave caller privilege, including for the fallback reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEscalate;

impl PrivilegeEscalationPolicy for NeverEscalate {
    fn escalate(&self, _scope: &ContextRef, _failure: &StoreError) -> Option<Privilege> {
        None
    }

    fn fallback_privilege(&self) -> Privilege {
        Privilege::Caller
    }

    fn name(&self) -> &'static str {
        "never"
    }
}

/// Build a policy from its config name.
pub fn policy_from_name(name: &str) -> Option<Box<dyn PrivilegeEscalationPolicy>> {
    match name {
        "always" => Some(Box::new(AlwaysEscalate)),
        "policy-rejection" => Some(Box::new(EscalateOnPolicyRejection)),
        "never" => Some(Box::new(NeverEscalate)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ContextRef {
        ContextRef::document("doc-1")
    }

    #[test]
    fn always_escalates_every_failure() {
        let policy = AlwaysEscalate;
        let missing = StoreError::ProcedureUnavailable {
            procedure: "match_chunks".into(),
            message: "not found".into(),
        };
        assert_eq!(policy.escalate(&scope(), &missing), Some(Privilege::Elevated));
        assert_eq!(policy.fallback_privilege(), Privilege::Elevated);
    }

    #[test]
    fn policy_rejection_only_escalates_rejections() {
        let policy = EscalateOnPolicyRejection;
        let rejected = StoreError::PolicyRejection("jwt role mismatch".into());
        let timeout = StoreError::Timeout(std::time::Duration::from_secs(30));
        assert_eq!(policy.escalate(&scope(), &rejected), Some(Privilege::Elevated));
        assert_eq!(policy.escalate(&scope(), &timeout), None);
    }

    #[test]
    fn never_stays_at_caller() {
        let policy = NeverEscalate;
        let rejected = StoreError::PolicyRejection("denied".into());
        assert_eq!(policy.escalate(&scope(), &rejected), None);
        assert_eq!(policy.fallback_privilege(), Privilege::Caller);
    }

    #[test]
    fn resolves_policies_by_name() {
        for name in ["always", "policy-rejection", "never"] {
            assert_eq!(policy_from_name(name).unwrap().name(), name);
        }
        assert!(policy_from_name("sometimes").is_none());
    }
}
