// Copyright (c) 2022-2023 The MobileCoin Foundation

//! ECDAA random key management
//!
//! ECDAA signatures on Barreto-Naehrig keys consume a per-session random
//! key held in a reserved, transient object.

use log::{debug, error, warn};

use se05x_apdu::{
    ids,
    policy::{AccessRules, PolicySet},
    types::{EcCurve, KeyPart, Origin, SecObjType, SetIndicator, Status},
    Exchange,
};

use crate::{api::EcKeyWrite, Error, Session};

/// Authentication object id carried by the random key policy
const RANDOM_KEY_AUTH_ID: u32 = 0;

/// Number of reserved random key identifiers
const RANDOM_KEY_COUNT: u32 = 0x0001_0000;

/// Reserved random key identifier for a session
pub fn random_key_id(auth_id: u32, has_session: bool) -> u32 {
    match has_session {
        true => auth_id % (RANDOM_KEY_COUNT - 1) + ids::ECDAA_RANDOM_START + 1,
        false => ids::ECDAA_RANDOM_START,
    }
}

/// Policy attached to generated random keys
pub fn random_key_policy() -> PolicySet {
    PolicySet::single(
        RANDOM_KEY_AUTH_ID,
        AccessRules::SIGN | AccessRules::GEN | AccessRules::KA | AccessRules::READ | AccessRules::DELETE,
    )
}

impl<T: Exchange + Send + Sync> Session<T> {
    /// Provision a curve when the element does not list it as set,
    /// tolerating `CONDITIONS_NOT_SATISFIED` from the create call
    pub(crate) async fn ensure_curve(&self, curve: EcCurve) -> Result<(), Error> {
        if curve.is_reserved() {
            return Ok(());
        }

        let list = self.read_curve_list().await?;
        let idx = u8::from(curve) as usize - 1;
        if list.get(idx) == Some(&SetIndicator::Set) {
            return Ok(());
        }

        debug!("Creating curve {}", curve);

        match self.create_curve(curve).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_status(Status::ConditionsNotSatisfied) => {
                warn!("Allowing SM_ERR_CONDITIONS_NOT_SATISFIED for CreateCurve");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Create or refresh the session ECDAA random key, returning its id
    pub(crate) async fn ensure_ecdaa_random_key(&self) -> Result<u32, Error> {
        let id = random_key_id(self.auth_id().await, self.has_session_id().await);

        let exists = self.check_object_exists(id).await.map_err(|e| {
            warn!(
                "Fail to check random key 0x{:x} exists. It may have already been occupied by another session",
                id
            );
            e
        })?;

        if !exists {
            self.ensure_curve(EcCurve::BnP256).await?;

            debug!("Create Key 0x{:x} as random keypair", id);

            let policy = random_key_policy();
            return self
                .write_ec_key(&EcKeyWrite {
                    id,
                    part: KeyPart::Private,
                    transient: true,
                    auth: false,
                    policy: Some(&policy),
                    max_attempts: None,
                    curve: Some(EcCurve::BnP256),
                    private: None,
                    public: None,
                })
                .await
                .map(|_| id);
        }

        let attrs = self.read_attributes(id).await?;
        if attrs.obj_type != SecObjType::EcPrivKey {
            error!("Random key 0x{:x} has unexpected type {}", id, attrs.obj_type);
            return Err(Error::Unsupported("ECDAA random key type"));
        }

        // Transient content is lost on applet reselect
        if attrs.origin == Origin::Na {
            debug!("Key 0x{:x} already exist. Regenerate it", id);

            self.write_ec_key(&EcKeyWrite {
                id,
                part: KeyPart::Na,
                transient: false,
                auth: false,
                policy: None,
                max_attempts: None,
                curve: None,
                private: None,
                public: None,
            })
            .await?;
        }

        Ok(id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn random_key_ids() {
        assert_eq!(random_key_id(0x1234, false), 0x7DB0_0000);
        assert_eq!(random_key_id(0, true), 0x7DB0_0001);
        assert_eq!(random_key_id(0x7FFF_0200, true), 0x7DB0_0000 + 1 + 0x7FFF_0200 % 0xFFFF);
        assert_eq!(random_key_id(0xFFFE, true), 0x7DB0_FFFF);
        assert_eq!(random_key_id(0xFFFF, true), 0x7DB0_0001);

        for a in [0, 1, 0xFFFE, 0xFFFF, 0x1_0000, u32::MAX] {
            assert!(ids::is_ecdaa_random(random_key_id(a, true)));
        }
    }

    #[test]
    fn random_key_policy_rules() {
        let p = random_key_policy();
        let r = p.rules_for(0x1234).unwrap();
        assert!(r.contains(AccessRules::SIGN | AccessRules::GEN | AccessRules::KA));
        assert!(r.contains(AccessRules::READ | AccessRules::DELETE));
        assert!(!r.contains(AccessRules::WRITE));
    }
}
