//! Type tag → decoder tables for actions and authenticators.
//!
//! A `Registry` is built once at startup and shared behind an `Arc`; there
//! is no process-wide registry, so several VMs can live in one process.

use std::collections::BTreeMap;

use tokenvm_primitives::{CodecError, Reader};

use crate::action::{
    Action, BurnAsset, CloseOrder, CreateAsset, CreateOrder, ExportAsset, FillOrder, ImportAsset,
    MintAsset, ModifyAsset, Transfer,
};
use crate::auth::Auth;
use crate::error::RegistryError;

pub type ActionDecoder = fn(&mut Reader<'_>) -> Result<Action, CodecError>;
pub type AuthDecoder = fn(&mut Reader<'_>) -> Result<Auth, CodecError>;

#[derive(Clone, Default)]
pub struct Registry {
    actions: BTreeMap<u8, ActionDecoder>,
    auths: BTreeMap<u8, AuthDecoder>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("auths", &self.auths.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard tokenvm action and auth set.
    pub fn tokenvm() -> Self {
        let actions: [(u8, ActionDecoder); 10] = [
            (Action::CREATE_ASSET, CreateAsset::decode),
            (Action::MINT_ASSET, MintAsset::decode),
            (Action::BURN_ASSET, BurnAsset::decode),
            (Action::MODIFY_ASSET, ModifyAsset::decode),
            (Action::TRANSFER, Transfer::decode),
            (Action::CREATE_ORDER, CreateOrder::decode),
            (Action::FILL_ORDER, FillOrder::decode),
            (Action::CLOSE_ORDER, CloseOrder::decode),
            (Action::IMPORT_ASSET, ImportAsset::decode),
            (Action::EXPORT_ASSET, ExportAsset::decode),
        ];
        let auths: [(u8, AuthDecoder); 1] = [(Auth::ED25519, Auth::decode_ed25519)];
        Self {
            actions: actions.into_iter().collect(),
            auths: auths.into_iter().collect(),
        }
    }

    pub fn register_action(&mut self, tag: u8, decoder: ActionDecoder) -> Result<(), RegistryError> {
        if self.actions.contains_key(&tag) {
            return Err(RegistryError::Duplicate { kind: "action", tag });
        }
        self.actions.insert(tag, decoder);
        Ok(())
    }

    pub fn register_auth(&mut self, tag: u8, decoder: AuthDecoder) -> Result<(), RegistryError> {
        if self.auths.contains_key(&tag) {
            return Err(RegistryError::Duplicate { kind: "auth", tag });
        }
        self.auths.insert(tag, decoder);
        Ok(())
    }

    pub fn decode_action(&self, r: &mut Reader<'_>) -> Result<Action, CodecError> {
        let tag = r.read_u8()?;
        let decoder = self
            .actions
            .get(&tag)
            .ok_or(CodecError::UnknownType { kind: "action", tag })?;
        decoder(r)
    }

    pub fn decode_auth(&self, r: &mut Reader<'_>) -> Result<Auth, CodecError> {
        let tag = r.read_u8()?;
        let decoder = self
            .auths
            .get(&tag)
            .ok_or(CodecError::UnknownType { kind: "auth", tag })?;
        decoder(r)
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}
