//! The offline executor.
//!
//! An online node hands over an [`Operation`] whenever its round enters a
//! state that needs secret material; the executor answers with operations
//! whose `result_msgs` the node feeds back into the round. All executor state
//! sits behind one mutex, so operations are handled strictly one at a time.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tessera_dkg::codec::g1_from_bytes;
use tessera_dkg::{bls, ecies, BlsKeyring, Deal, DkgInstance, KeyPair, PartialSignature, PublicPolynomial};
use tessera_protocol::requests::{
    ConfirmationErrorRequest, DkgProposalConfirmationRequest, SigningProposalPartialSignRequest,
};
use tessera_protocol::responses::{
    DkgPubKeys, DkgStageResponse, PartialSignEntry, SigningPartialSignsRequested,
};
use tessera_protocol::{DkgStage, Event, Message, Operation, ParticipantId, ProtocolError, Request, State};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::ExecutorConfig;
use crate::error::{AirgappedError, Result};
use crate::store::{get_sealed, put_sealed, KeyStore, Keyspace};

/// Store key of the long-term DKG key pair
pub const KEY_PAIR_KEY: &str = "dkg_key_pair";

/// Per-round DKG handle
struct RoundContext {
    participant_id: ParticipantId,
    title: String,
    dkg: DkgInstance,
}

/// Keyring as sealed under [`Keyspace::BlsKeyring`]
#[derive(Serialize, Deserialize)]
struct StoredKeyring {
    participant_id: ParticipantId,
    title: String,
    keyring: BlsKeyring,
}

struct MachineState {
    store: Box<dyn KeyStore>,
    config: ExecutorConfig,
    passphrase: Option<Zeroizing<Vec<u8>>>,
    key_pair: Option<KeyPair>,
    rounds: HashMap<String, RoundContext>,
}

/// Air-gapped executor
pub struct Machine {
    inner: Mutex<MachineState>,
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine").finish_non_exhaustive()
    }
}

fn confirm_error_event(state: State) -> Option<Event> {
    match state {
        State::SigningAwaitPartialSigns => Some(Event::SigningPartialSignError),
        other => DkgStage::from_await_state(other).map(DkgStage::confirm_error_event),
    }
}

fn decode<T: serde::de::DeserializeOwned>(op: &Operation) -> Result<T> {
    serde_json::from_slice(&op.payload)
        .map_err(|e| ProtocolError::serialization(format!("operation {} payload: {e}", op.operation_type)).into())
}

fn expect_stage(response: &DkgStageResponse, stage: DkgStage) -> Result<()> {
    if response.stage != stage {
        return Err(ProtocolError::invalid(format!("expected {stage} artifacts, got {}", response.stage)).into());
    }
    Ok(())
}

/// Copy of `op` carrying one result message
fn reply(op: &Operation, event: Event, request: &Request, sender: &str, recipient: Option<&str>) -> Result<Operation> {
    let mut message = Message::new(op.dkg_round_id.as_str(), event, request, sender)?;
    let mut out = op.clone();
    if let Some(recipient) = recipient {
        message = message.with_recipient(recipient);
        out.to = recipient.to_string();
    }
    out.result_msgs = vec![message];
    out.event = Some(event);
    out.created_at = Utc::now();
    Ok(out)
}

fn confirmation(participant_id: ParticipantId, payload: Vec<u8>) -> Request {
    Request::from(DkgProposalConfirmationRequest {
        participant_id,
        payload,
        created_at: Utc::now(),
    })
}

impl MachineState {
    fn passphrase(&self) -> Result<&[u8]> {
        self.passphrase
            .as_ref()
            .map(|passphrase| passphrase.as_slice())
            .ok_or(AirgappedError::Locked)
    }

    fn key_pair(&self) -> Result<&KeyPair> {
        self.key_pair.as_ref().ok_or(AirgappedError::Locked)
    }

    fn round_mut(&mut self, round: &str) -> Result<&mut RoundContext> {
        self.rounds
            .get_mut(round)
            .ok_or_else(|| AirgappedError::storage(format!("no dkg instance for round {round}")))
    }

    fn load_keyring(&self, round: &str) -> Result<StoredKeyring> {
        let bytes = get_sealed(
            self.store.as_ref(),
            Keyspace::BlsKeyring,
            round,
            self.passphrase()?,
            &self.config.kdf,
        )?
        .map(Zeroizing::new)
        .ok_or_else(|| AirgappedError::storage(format!("no keyring for round {round}")))?;
        let stored: StoredKeyring = serde_json::from_slice(&bytes)?;
        stored.keyring.check()?;
        Ok(stored)
    }

    fn save_keyring(&mut self, round: &str, stored: &StoredKeyring) -> Result<()> {
        let bytes = Zeroizing::new(serde_json::to_vec(stored)?);
        let passphrase = Zeroizing::new(self.passphrase()?.to_vec());
        put_sealed(
            self.store.as_mut(),
            Keyspace::BlsKeyring,
            round,
            &bytes,
            &passphrase,
            &self.config.kdf,
        )
    }

    /// Participant id and title this executor acts as in `op`'s round
    fn own_participant(&self, op: &Operation) -> Option<(ParticipantId, String)> {
        match op.operation_type {
            State::DkgCommitsAwaitConfirmations => {
                let own = self.key_pair().ok()?.public_bytes();
                let request: DkgPubKeys = serde_json::from_slice(&op.payload).ok()?;
                request
                    .participants
                    .into_iter()
                    .find(|entry| entry.dkg_pub_key == own)
                    .map(|entry| (entry.participant_id, entry.title))
            }
            State::SigningAwaitPartialSigns => self
                .load_keyring(&op.dkg_round_id)
                .ok()
                .map(|stored| (stored.participant_id, stored.title.clone())),
            _ => self
                .rounds
                .get(&op.dkg_round_id)
                .map(|ctx| (ctx.participant_id, ctx.title.clone())),
        }
    }

    fn dispatch(&mut self, op: &Operation) -> Result<Vec<Operation>> {
        match op.operation_type {
            State::DkgCommitsAwaitConfirmations => self.handle_commits(op),
            State::DkgDealsAwaitConfirmations => self.handle_deals(op),
            State::DkgResponsesAwaitConfirmations => self.handle_responses(op),
            State::DkgMasterKeyAwaitConfirmations => self.handle_master_key(op),
            State::SigningAwaitPartialSigns => self.handle_partial_sign(op),
            other => Err(AirgappedError::unsupported(other.to_string())),
        }
    }

    fn handle_commits(&mut self, op: &Operation) -> Result<Vec<Operation>> {
        let request: DkgPubKeys = decode(op)?;
        let key_pair = self.key_pair()?;
        let own_key = key_pair.public_bytes();
        let mut dkg = DkgInstance::new(*key_pair.public());

        let own = request
            .participants
            .iter()
            .find(|entry| entry.dkg_pub_key == own_key)
            .ok_or_else(|| AirgappedError::unsupported(format!("own key is not part of round {}", op.dkg_round_id)))?;

        for entry in &request.participants {
            dkg.store_pub_key(&entry.title, g1_from_bytes(&entry.dkg_pub_key)?)?;
        }
        dkg.init_instance(request.threshold, &mut OsRng)?;
        let commits = serde_json::to_vec(dkg.commits()?)?;

        let event = DkgStage::Commits.confirm_received_event();
        let out = reply(op, event, &confirmation(own.participant_id, commits), &own.title, None)?;
        debug!(round = %op.dkg_round_id, participant = own.participant_id, "dkg instance created");
        self.rounds.insert(
            op.dkg_round_id.clone(),
            RoundContext {
                participant_id: own.participant_id,
                title: own.title.clone(),
                dkg,
            },
        );
        Ok(vec![out])
    }

    fn handle_deals(&mut self, op: &Operation) -> Result<Vec<Operation>> {
        let response: DkgStageResponse = decode(op)?;
        expect_stage(&response, DkgStage::Commits)?;
        let mut commits = Vec::with_capacity(response.participants.len());
        for entry in &response.participants {
            let polynomial: PublicPolynomial = serde_json::from_slice(&entry.payload)?;
            commits.push((entry.title.as_str(), polynomial));
        }
        let ctx = self.round_mut(&op.dkg_round_id)?;
        ctx.dkg.store_all_commits(commits)?;

        let event = DkgStage::Deals.confirm_received_event();
        let mut out = Vec::new();
        for (recipient, deal) in ctx.dkg.deals()? {
            let title = ctx.dkg.participant_at(recipient)?;
            let plaintext = Zeroizing::new(serde_json::to_vec(&deal)?);
            let ciphertext = ecies::encrypt(ctx.dkg.pub_key(title)?, &plaintext, &mut OsRng)?;
            out.push(reply(
                op,
                event,
                &confirmation(ctx.participant_id, ciphertext),
                &ctx.title,
                Some(title),
            )?);
        }
        debug!(round = %op.dkg_round_id, deals = out.len(), "dkg deals encrypted");
        Ok(out)
    }

    fn handle_responses(&mut self, op: &Operation) -> Result<Vec<Operation>> {
        let response: DkgStageResponse = decode(op)?;
        expect_stage(&response, DkgStage::Deals)?;
        let key_pair = self.key_pair()?.clone();
        let ctx = self.round_mut(&op.dkg_round_id)?;

        let mut deals = Vec::with_capacity(response.participants.len());
        for entry in &response.participants {
            // Our own entry is one of the deals we sent out
            if entry.participant_id == ctx.participant_id {
                continue;
            }
            let plaintext = Zeroizing::new(ecies::decrypt(key_pair.secret(), &entry.payload)?);
            deals.push(serde_json::from_slice::<Deal>(&plaintext)?);
        }
        let responses = ctx.dkg.process_deals(deals)?;

        let event = DkgStage::Responses.confirm_received_event();
        let payload = serde_json::to_vec(&responses)?;
        Ok(vec![reply(op, event, &confirmation(ctx.participant_id, payload), &ctx.title, None)?])
    }

    fn handle_master_key(&mut self, op: &Operation) -> Result<Vec<Operation>> {
        let response: DkgStageResponse = decode(op)?;
        expect_stage(&response, DkgStage::Responses)?;
        let round = op.dkg_round_id.as_str();

        let (stored, master_key) = {
            let ctx = self.round_mut(round)?;
            for entry in &response.participants {
                ctx.dkg.store_responses(&entry.title, serde_json::from_slice(&entry.payload)?)?;
            }
            ctx.dkg.process_responses()?;
            let stored = StoredKeyring {
                participant_id: ctx.participant_id,
                title: ctx.title.clone(),
                keyring: ctx.dkg.bls_keyring()?,
            };
            (stored, ctx.dkg.distributed_public_key()?.to_compressed().to_vec())
        };

        self.save_keyring(round, &stored)?;
        self.rounds.remove(round);
        info!(round, index = stored.keyring.index, "bls keyring sealed");

        let event = DkgStage::MasterKey.confirm_received_event();
        Ok(vec![reply(
            op,
            event,
            &confirmation(stored.participant_id, master_key),
            &stored.title,
            None,
        )?])
    }

    fn handle_partial_sign(&mut self, op: &Operation) -> Result<Vec<Operation>> {
        let request: SigningPartialSignsRequested = decode(op)?;
        let stored = self.load_keyring(&op.dkg_round_id)?;
        if !request
            .participants
            .iter()
            .any(|entry| entry.participant_id == stored.participant_id)
        {
            return Err(ProtocolError::quorum_entry_not_found(format!(
                "participant {} is not a signer of {}",
                stored.participant_id, request.signing_id
            ))
            .into());
        }

        let partial_sign = bls::partial_sign(&stored.keyring, &request.src_payload).to_bytes()?;
        let message = Request::from(SigningProposalPartialSignRequest {
            signing_id: request.signing_id.clone(),
            participant_id: stored.participant_id,
            partial_sign,
            created_at: Utc::now(),
        });
        debug!(round = %op.dkg_round_id, signing_id = %request.signing_id, "partial signature produced");
        Ok(vec![reply(op, Event::SigningPartialSignReceived, &message, &stored.title, None)?])
    }
}

impl Machine {
    /// Executor over `store`; call [`Machine::unlock`] before handling operations
    pub fn new(store: impl KeyStore + 'static, config: ExecutorConfig) -> Self {
        Self {
            inner: Mutex::new(MachineState {
                store: Box::new(store),
                config,
                passphrase: None,
                key_pair: None,
                rounds: HashMap::new(),
            }),
        }
    }

    /// Set the passphrase and load the key pair, generating and sealing one on first use
    pub fn unlock(&self, passphrase: &[u8]) -> Result<()> {
        let mut state = self.inner.lock();
        let state = &mut *state;
        let kdf = state.config.kdf;

        let key_pair = match get_sealed(state.store.as_ref(), Keyspace::KeyPair, KEY_PAIR_KEY, passphrase, &kdf)? {
            Some(secret) => KeyPair::from_secret_bytes(&Zeroizing::new(secret))?,
            None => {
                let key_pair = KeyPair::generate(&mut OsRng);
                let secret = Zeroizing::new(key_pair.secret_bytes());
                put_sealed(
                    state.store.as_mut(),
                    Keyspace::KeyPair,
                    KEY_PAIR_KEY,
                    secret.as_slice(),
                    passphrase,
                    &kdf,
                )?;
                info!("generated dkg key pair");
                key_pair
            }
        };

        state.passphrase = Some(Zeroizing::new(passphrase.to_vec()));
        state.key_pair = Some(key_pair);
        Ok(())
    }

    /// Compressed long-term public key, as announced in the participants list
    pub fn dkg_pub_key(&self) -> Result<Vec<u8>> {
        Ok(self.inner.lock().key_pair()?.public_bytes().to_vec())
    }

    /// Run one operation.
    ///
    /// Failures of the DKG or signing work come back as a single operation
    /// reporting the error to the round; only locked executors, unsupported
    /// operation types and operations the executor cannot attribute to itself
    /// fail the call.
    pub fn handle_operation(&self, op: &Operation) -> Result<Vec<Operation>> {
        let mut state = self.inner.lock();
        state.key_pair()?;
        let error_event = confirm_error_event(op.operation_type)
            .ok_or_else(|| AirgappedError::unsupported(op.operation_type.to_string()))?;

        let err = match state.dispatch(op) {
            Ok(out) => return Ok(out),
            Err(err) => err,
        };
        let (participant_id, title) = state.own_participant(op).ok_or_else(|| {
            AirgappedError::unsupported(format!(
                "cannot identify own participant in round {}: {err}",
                op.dkg_round_id
            ))
        })?;

        warn!(
            round = %op.dkg_round_id,
            operation = %op.operation_type,
            error = %err,
            "operation failed, reporting error"
        );
        let request = Request::from(ConfirmationErrorRequest {
            participant_id,
            error: err.to_string(),
            created_at: Utc::now(),
        });
        Ok(vec![reply(op, error_event, &request, &title, None)?])
    }

    /// Interpolate a full signature from encoded partial signatures
    pub fn reconstruct_threshold_signature(
        &self,
        round: &str,
        msg: &[u8],
        partial_signs: &[PartialSignEntry],
    ) -> Result<Vec<u8>> {
        let stored = self.inner.lock().load_keyring(round)?;
        let partials: Vec<PartialSignature> = partial_signs
            .iter()
            .filter_map(|entry| match PartialSignature::from_bytes(&entry.partial_sign) {
                Ok(partial) => Some(partial),
                Err(err) => {
                    warn!(round, participant = entry.participant_id, error = %err, "skipping malformed partial signature");
                    None
                }
            })
            .collect();
        let signature = bls::recover(
            &stored.keyring.public_polynomial,
            msg,
            &partials,
            stored.keyring.threshold,
        )?;
        Ok(signature.to_compressed().to_vec())
    }

    /// Check a full signature against the round's master public key
    pub fn verify_threshold_signature(&self, round: &str, msg: &[u8], signature: &[u8]) -> Result<()> {
        let stored = self.inner.lock().load_keyring(round)?;
        let signature = g1_from_bytes(signature)?;
        bls::verify(&stored.keyring.master_public_key()?, msg, &signature)?;
        Ok(())
    }

    /// Compressed master public key of a finished round
    pub fn master_public_key(&self, round: &str) -> Result<Vec<u8>> {
        let stored = self.inner.lock().load_keyring(round)?;
        Ok(stored.keyring.master_public_key()?.to_compressed().to_vec())
    }

    /// Forget in-flight DKG instances and the cached passphrase
    pub fn drop_sensitive_data(&self) {
        let mut state = self.inner.lock();
        state.rounds.clear();
        state.passphrase = None;
        info!("sensitive data dropped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::KdfConfig;
    use crate::store::MemoryStore;

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            kdf: KdfConfig::insecure_for_tests(),
        }
    }

    #[test]
    fn test_locked_machine_refuses_work() {
        let machine = Machine::new(MemoryStore::new(), config());
        let op = Operation::new("round", State::DkgCommitsAwaitConfirmations, b"{}".to_vec());
        assert_eq!(machine.handle_operation(&op).unwrap_err(), AirgappedError::Locked);
        assert_eq!(machine.dkg_pub_key().unwrap_err(), AirgappedError::Locked);
    }

    #[test]
    fn test_unlock_is_stable_across_restarts() {
        let mut store = MemoryStore::new();
        let kdf = KdfConfig::insecure_for_tests();
        let first = Machine::new(store.clone(), config());
        first.unlock(b"pw").unwrap();
        let key = first.dkg_pub_key().unwrap();
        assert_eq!(key.len(), 48);

        // Copy the sealed key pair into a fresh store
        let state = first.inner.lock();
        for keyspace in [Keyspace::KeyPair, Keyspace::Salt] {
            let value = state.store.get(keyspace, KEY_PAIR_KEY).unwrap().unwrap();
            store.put(keyspace, KEY_PAIR_KEY, value).unwrap();
        }
        drop(state);
        assert!(get_sealed(&store, Keyspace::KeyPair, KEY_PAIR_KEY, b"pw", &kdf).unwrap().is_some());

        let second = Machine::new(store.clone(), config());
        second.unlock(b"pw").unwrap();
        assert_eq!(second.dkg_pub_key().unwrap(), key);

        let third = Machine::new(store, config());
        assert!(matches!(third.unlock(b"wrong"), Err(AirgappedError::Sealing { .. })));
    }

    #[test]
    fn test_unsupported_operation_type() {
        let machine = Machine::new(MemoryStore::new(), config());
        machine.unlock(b"pw").unwrap();
        let op = Operation::new("round", State::SigProposalCollected, Vec::new());
        assert!(matches!(
            machine.handle_operation(&op),
            Err(AirgappedError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_failure_without_identity_is_an_error() {
        let machine = Machine::new(MemoryStore::new(), config());
        machine.unlock(b"pw").unwrap();
        let op = Operation::new("round", State::DkgDealsAwaitConfirmations, b"not json".to_vec());
        assert!(matches!(
            machine.handle_operation(&op),
            Err(AirgappedError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_drop_sensitive_data_locks_keyring_access() {
        let machine = Machine::new(MemoryStore::new(), config());
        machine.unlock(b"pw").unwrap();
        machine.drop_sensitive_data();
        assert!(machine.master_public_key("round").is_err());
        assert!(machine.inner.lock().passphrase.is_none());
    }
}
