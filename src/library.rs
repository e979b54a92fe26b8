//! Message library (C3): a bidirectional mapping between user payload types
//! and frame identities.
//!
//! The original Go implementation keys its two maps by `reflect.Type`; the
//! direct Rust analogue of "the runtime type identifier of the payload type"
//! is [`std::any::TypeId`], obtained through the [`Payload`] trait's `'static`
//! bound (Design Note "dynamic payload types via runtime type identity",
//! option (a)).

use std::any::TypeId;
use std::collections::HashMap;

use crate::frame::Identity;

/// The external payload (de)serialisation collaborator.
///
/// Out of scope per spec §1: "the payload serialisation library used to
/// encode/decode user payload bytes (treated as an opaque `encode(value) →
/// bytes` / `decode(bytes, into value)` collaborator)". Implementors are free
/// to back this with any serialisation scheme; the broker only ever calls
/// `encode`/`decode`.
pub trait Payload: std::fmt::Debug + Send + Sync + 'static {
    /// Serialisation error type, boxed into [`crate::UnpiError::Encode`] /
    /// [`crate::UnpiError::Decode`] at the call site.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Encode `self` into UNPI payload bytes (0–255 bytes; longer payloads
    /// must fail here per the UNPI length cap, spec §9).
    fn encode(&self) -> Result<Vec<u8>, Self::Error>;

    /// Decode UNPI payload bytes into a fresh value.
    fn decode(bytes: &[u8]) -> Result<Self, Self::Error>
    where
        Self: Sized;
}

/// Bidirectional `identity <-> type_token` registry.
///
/// Read-mostly: populate at startup via [`MessageLibrary::add`] before
/// starting the broker, then consult per transaction. No internal
/// synchronisation is provided — per spec §4.2, registrations should complete
/// before the broker starts taking concurrent transactions.
#[derive(Default)]
pub struct MessageLibrary {
    identity_to_type: HashMap<Identity, TypeId>,
    type_to_identity: HashMap<TypeId, Identity>,
}

impl MessageLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bidirectional mapping for `T` under `identity`.
    ///
    /// Idempotent on re-registration of the same key: re-adding the same
    /// `identity` for a different type, or the same type under a different
    /// identity, overwrites both maps — last writer wins.
    pub fn add<T: Payload>(&mut self, identity: Identity) {
        let type_id = TypeId::of::<T>();

        if let Some(stale_identity) = self.type_to_identity.insert(type_id, identity) {
            if stale_identity != identity {
                self.identity_to_type.remove(&stale_identity);
            }
        }
        if let Some(stale_type) = self.identity_to_type.insert(identity, type_id) {
            if stale_type != type_id {
                self.type_to_identity.remove(&stale_type);
            }
        }
    }

    /// Look up the registered type for `identity`, returning its `TypeId` if
    /// found. Mirrors the original's `(type_token, found)` pair via `Option`.
    pub fn get_by_identity(&self, identity: Identity) -> Option<TypeId> {
        self.identity_to_type.get(&identity).copied()
    }

    /// `true` if `T` is registered under `identity` specifically (used by
    /// transactions to confirm the expected response type matches what
    /// arrived, in addition to the identity match dispatch already performed).
    pub fn identity_matches<T: Payload>(&self, identity: Identity) -> bool {
        self.get_by_identity(identity) == Some(TypeId::of::<T>())
    }

    /// Look up the identity registered for value type `T`. Takes a reference
    /// to a value so that a direct value and a handle to it (`&T` vs `&&T`
    /// through auto-deref) resolve identically — the lookup itself only ever
    /// consults `T`'s static type, never the runtime value.
    pub fn get_by_value<T: Payload>(&self, _value: &T) -> Option<Identity> {
        self.type_to_identity.get(&TypeId::of::<T>()).copied()
    }

    /// Look up the identity registered for `T` without needing an instance.
    pub fn get_by_type<T: Payload>(&self) -> Option<Identity> {
        self.type_to_identity.get(&TypeId::of::<T>()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{MessageType, Subsystem};
    use std::convert::Infallible;

    #[derive(Debug, PartialEq)]
    struct Req(u16);
    impl Payload for Req {
        type Error = Infallible;
        fn encode(&self) -> Result<Vec<u8>, Infallible> {
            Ok(self.0.to_le_bytes().to_vec())
        }
        fn decode(bytes: &[u8]) -> Result<Self, Infallible> {
            Ok(Req(u16::from_le_bytes([bytes[0], bytes[1]])))
        }
    }

    #[derive(Debug, PartialEq)]
    struct Resp(u8);
    impl Payload for Resp {
        type Error = Infallible;
        fn encode(&self) -> Result<Vec<u8>, Infallible> {
            Ok(vec![self.0])
        }
        fn decode(bytes: &[u8]) -> Result<Self, Infallible> {
            Ok(Resp(bytes[0]))
        }
    }

    #[test]
    fn bijective_over_registered_set() {
        let mut lib = MessageLibrary::new();
        let req_id = Identity::new(MessageType::SREQ, Subsystem::SYS, 0x01);
        let resp_id = Identity::new(MessageType::SRSP, Subsystem::SYS, 0x02);
        lib.add::<Req>(req_id);
        lib.add::<Resp>(resp_id);

        assert_eq!(lib.get_by_value(&Req(0)), Some(req_id));
        assert_eq!(lib.get_by_value(&Resp(0)), Some(resp_id));
        assert!(lib.identity_matches::<Req>(req_id));
        assert!(lib.identity_matches::<Resp>(resp_id));
        assert!(!lib.identity_matches::<Req>(resp_id));
    }

    #[test]
    fn unregistered_type_is_not_found() {
        let lib = MessageLibrary::new();
        assert_eq!(lib.get_by_value(&Req(0)), None);
    }

    #[test]
    fn re_add_same_identity_is_last_writer_wins() {
        let mut lib = MessageLibrary::new();
        let id = Identity::new(MessageType::AREQ, Subsystem::SYS, 0x01);
        lib.add::<Req>(id);
        lib.add::<Resp>(id);

        assert_eq!(lib.get_by_value(&Req(0)), None);
        assert_eq!(lib.get_by_value(&Resp(0)), Some(id));
    }
}
