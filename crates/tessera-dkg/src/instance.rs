//! Per-round joint Feldman DKG state held by one participant.
//!
//! The round runs in four steps, each fed with the other participants'
//! output of the previous one:
//!
//! 1. [`DkgInstance::init_instance`] fixes indices and samples the secret
//!    polynomial; [`DkgInstance::commits`] is broadcast.
//! 2. [`DkgInstance::store_commits`] for every peer, then
//!    [`DkgInstance::deals`] yields one private share per peer.
//! 3. [`DkgInstance::process_deals`] verifies the inbound shares and returns
//!    approvals to broadcast.
//! 4. [`DkgInstance::store_responses`] for every peer, then
//!    [`DkgInstance::process_responses`] certifies the round and
//!    [`DkgInstance::bls_keyring`] derives the key material.

use std::collections::{BTreeMap, BTreeSet};

use bls12_381::{G1Affine, G2Affine, Scalar};
use ff::Field;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::scalar_hex;
use crate::error::{DkgError, Result};
use crate::keyring::BlsKeyring;
use crate::vss::{commit, evaluate_polynomial, generate_polynomial, verify_share, PublicPolynomial};

/// Private share from one dealer to one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    /// Dealer index
    pub dealer_index: u32,
    /// Recipient index
    pub recipient_index: u32,
    /// `f_dealer(recipient_index)`
    #[serde(with = "scalar_hex")]
    pub share: Scalar,
    /// Dealer's commitments, compared with the broadcast ones
    pub commitments: PublicPolynomial,
}

/// A verifier's verdict on one dealer's share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Dealer index
    pub dealer_index: u32,
    /// Verifier index
    pub verifier_index: u32,
    /// Whether the share verified
    pub approved: bool,
}

struct Dealing {
    index: u32,
    threshold: usize,
    coefficients: Vec<Scalar>,
    commitments: PublicPolynomial,
}

/// DKG state for one participant in one round
pub struct DkgInstance {
    own_public: G1Affine,
    pub_keys: BTreeMap<String, G1Affine>,
    /// Participants ordered by index, `participants[i - 1]` holds index `i`
    participants: Vec<String>,
    dealing: Option<Dealing>,
    commits: BTreeMap<u32, PublicPolynomial>,
    shares: BTreeMap<u32, Scalar>,
    responses: BTreeMap<u32, Vec<Response>>,
    certified: bool,
}

impl DkgInstance {
    /// New round for the holder of `own_public`
    pub fn new(own_public: G1Affine) -> Self {
        Self {
            own_public,
            pub_keys: BTreeMap::new(),
            participants: Vec::new(),
            dealing: None,
            commits: BTreeMap::new(),
            shares: BTreeMap::new(),
            responses: BTreeMap::new(),
            certified: false,
        }
    }

    /// Register a participant's long-term key.
    ///
    /// Returns `false` when the same pair was already known.
    pub fn store_pub_key(&mut self, participant: &str, pub_key: G1Affine) -> Result<bool> {
        if self.dealing.is_some() {
            return Err(DkgError::AlreadyInitialized);
        }
        match self.pub_keys.get(participant) {
            Some(known) if *known == pub_key => return Ok(false),
            Some(_) => return Err(DkgError::DuplicateParticipant(participant.to_string())),
            None => {}
        }
        if self.pub_keys.values().any(|known| *known == pub_key) {
            return Err(DkgError::DuplicateParticipant(participant.to_string()));
        }
        debug!(participant, "stored dkg public key");
        self.pub_keys.insert(participant.to_string(), pub_key);
        Ok(true)
    }

    /// Assign indices and sample this participant's secret polynomial
    pub fn init_instance<R: RngCore + CryptoRng>(&mut self, threshold: usize, rng: &mut R) -> Result<()> {
        if self.dealing.is_some() {
            return Err(DkgError::AlreadyInitialized);
        }
        let n = self.pub_keys.len();
        if threshold == 0 || threshold > n {
            return Err(DkgError::InvalidThreshold {
                threshold,
                participants: n,
            });
        }

        let mut ordered: Vec<(&String, [u8; 48])> = self
            .pub_keys
            .iter()
            .map(|(participant, key)| (participant, key.to_compressed()))
            .collect();
        ordered.sort_by(|a, b| a.1.cmp(&b.1));

        let own = self.own_public.to_compressed();
        let position = ordered
            .iter()
            .position(|(_, key)| *key == own)
            .ok_or_else(|| DkgError::UnknownParticipant(hex::encode(own)))?;
        let index = index_from_position(position)?;

        self.participants = ordered.into_iter().map(|(participant, _)| participant.clone()).collect();

        let coefficients = generate_polynomial(Scalar::random(&mut *rng), threshold, rng);
        let commitments = commit(&coefficients);
        self.shares
            .insert(index, evaluate_polynomial(&coefficients, &Scalar::from(u64::from(index))));
        self.commits.insert(index, commitments.clone());
        self.dealing = Some(Dealing {
            index,
            threshold,
            coefficients,
            commitments,
        });

        debug!(index, threshold, participants = n, "dkg instance initialized");
        Ok(())
    }

    fn dealing(&self) -> Result<&Dealing> {
        self.dealing.as_ref().ok_or(DkgError::NotInitialized)
    }

    /// Own participant index
    pub fn index(&self) -> Result<u32> {
        Ok(self.dealing()?.index)
    }

    /// Reconstruction threshold
    pub fn threshold(&self) -> Result<usize> {
        Ok(self.dealing()?.threshold)
    }

    /// Number of participants
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// Index assigned to `participant`
    pub fn index_of(&self, participant: &str) -> Result<u32> {
        self.dealing()?;
        let position = self
            .participants
            .iter()
            .position(|known| known == participant)
            .ok_or_else(|| DkgError::UnknownParticipant(participant.to_string()))?;
        index_from_position(position)
    }

    /// Participant holding `index`
    pub fn participant_at(&self, index: u32) -> Result<&str> {
        self.dealing()?;
        index
            .checked_sub(1)
            .and_then(|position| self.participants.get(position as usize))
            .map(String::as_str)
            .ok_or_else(|| DkgError::UnknownParticipant(index.to_string()))
    }

    /// Public key registered for `participant`
    pub fn pub_key(&self, participant: &str) -> Result<&G1Affine> {
        self.pub_keys
            .get(participant)
            .ok_or_else(|| DkgError::UnknownParticipant(participant.to_string()))
    }

    /// Own Feldman commitments
    pub fn commits(&self) -> Result<&PublicPolynomial> {
        Ok(&self.dealing()?.commitments)
    }

    /// Index under which `commits` would be stored, `None` if already known
    fn check_commits(&self, participant: &str, commits: &PublicPolynomial) -> Result<Option<u32>> {
        let threshold = self.threshold()?;
        let index = self.index_of(participant)?;
        if commits.threshold() != threshold {
            return Err(DkgError::InvalidThreshold {
                threshold: commits.threshold(),
                participants: self.participants.len(),
            });
        }
        match self.commits.get(&index) {
            Some(known) if known == commits => Ok(None),
            Some(_) => Err(DkgError::CommitmentMismatch(index)),
            None => Ok(Some(index)),
        }
    }

    /// Record a peer's broadcast commitments
    pub fn store_commits(&mut self, participant: &str, commits: PublicPolynomial) -> Result<()> {
        if let Some(index) = self.check_commits(participant, &commits)? {
            debug!(participant, index, "stored dkg commitments");
            self.commits.insert(index, commits);
        }
        Ok(())
    }

    /// Record several peers' commitments; nothing is stored if any entry is rejected
    pub fn store_all_commits<'a>(
        &mut self,
        commits: impl IntoIterator<Item = (&'a str, PublicPolynomial)>,
    ) -> Result<()> {
        let mut fresh: BTreeMap<u32, PublicPolynomial> = BTreeMap::new();
        for (participant, polynomial) in commits {
            let Some(index) = self.check_commits(participant, &polynomial)? else {
                continue;
            };
            match fresh.get(&index) {
                Some(known) if *known != polynomial => return Err(DkgError::CommitmentMismatch(index)),
                Some(_) => {}
                None => {
                    fresh.insert(index, polynomial);
                }
            }
        }
        debug!(count = fresh.len(), "stored dkg commitments");
        self.commits.extend(fresh);
        Ok(())
    }

    /// One deal per peer keyed by recipient index
    pub fn deals(&self) -> Result<BTreeMap<u32, Deal>> {
        let dealing = self.dealing()?;
        let deals = (1..=self.participants.len())
            .filter_map(|position| u32::try_from(position).ok())
            .filter(|recipient| *recipient != dealing.index)
            .map(|recipient| {
                let deal = Deal {
                    dealer_index: dealing.index,
                    recipient_index: recipient,
                    share: evaluate_polynomial(&dealing.coefficients, &Scalar::from(u64::from(recipient))),
                    commitments: dealing.commitments.clone(),
                };
                (recipient, deal)
            })
            .collect();
        Ok(deals)
    }

    /// Verify every peer's deal for this participant.
    ///
    /// Nothing is recorded unless every deal checks out and none is missing.
    pub fn process_deals(&mut self, deals: impl IntoIterator<Item = Deal>) -> Result<Vec<Response>> {
        let own = self.index()?;
        let n = self.participants.len();
        let mut accepted: BTreeMap<u32, Scalar> = BTreeMap::new();

        for deal in deals {
            let dealer = deal.dealer_index;
            if dealer == own {
                continue;
            }
            if dealer == 0 || dealer as usize > n {
                return Err(DkgError::UnknownParticipant(dealer.to_string()));
            }
            if deal.recipient_index != own || accepted.contains_key(&dealer) {
                return Err(DkgError::InvalidShare(dealer));
            }
            match self.commits.get(&dealer) {
                Some(published) if *published == deal.commitments => {}
                _ => return Err(DkgError::CommitmentMismatch(dealer)),
            }
            if !verify_share(&deal.share, own, &deal.commitments) {
                return Err(DkgError::InvalidShare(dealer));
            }
            accepted.insert(dealer, deal.share);
        }

        let missing: Vec<u32> = self
            .other_indices(own)
            .filter(|dealer| !accepted.contains_key(dealer))
            .collect();
        if !missing.is_empty() {
            return Err(DkgError::MissingDeals(missing));
        }

        let responses: Vec<Response> = accepted
            .keys()
            .map(|dealer| Response {
                dealer_index: *dealer,
                verifier_index: own,
                approved: true,
            })
            .collect();
        self.shares.extend(accepted);
        self.responses.insert(own, responses.clone());
        debug!(index = own, deals = responses.len(), "dkg deals verified");
        Ok(responses)
    }

    /// Record a peer's approvals
    pub fn store_responses(&mut self, participant: &str, responses: Vec<Response>) -> Result<()> {
        let index = self.index_of(participant)?;
        if let Some(foreign) = responses.iter().find(|response| response.verifier_index != index) {
            return Err(DkgError::UnknownParticipant(foreign.verifier_index.to_string()));
        }
        debug!(participant, index, count = responses.len(), "stored dkg responses");
        self.responses.insert(index, responses);
        self.certified = false;
        Ok(())
    }

    /// Certify the round once every dealer is approved by every other participant
    pub fn process_responses(&mut self) -> Result<()> {
        let n = u32::try_from(self.participants.len()).map_err(|_| DkgError::NotInitialized)?;
        self.dealing()?;

        for dealer in 1..=n {
            for verifier in self.other_indices(dealer) {
                let approved = self
                    .responses
                    .get(&verifier)
                    .map(|responses| {
                        let verdicts: Vec<bool> = responses
                            .iter()
                            .filter(|response| response.dealer_index == dealer)
                            .map(|response| response.approved)
                            .collect();
                        !verdicts.is_empty() && verdicts.iter().all(|approved| *approved)
                    })
                    .unwrap_or(false);
                if !approved {
                    return Err(DkgError::NotCertified(format!(
                        "dealer {dealer} lacks approval from participant {verifier}"
                    )));
                }
            }
        }
        self.certified = true;
        Ok(())
    }

    fn public_polynomial(&self) -> Result<PublicPolynomial> {
        let dealers: BTreeSet<u32> = self.commits.keys().copied().collect();
        let missing: Vec<u32> = self
            .all_indices()
            .filter(|index| !dealers.contains(index))
            .collect();
        if !missing.is_empty() {
            return Err(DkgError::MissingDeals(missing));
        }
        PublicPolynomial::sum(self.commits.values())
    }

    /// Master public key of the round
    pub fn distributed_public_key(&self) -> Result<G2Affine> {
        self.public_polynomial()?.public_key()
    }

    /// Whether [`DkgInstance::process_responses`] has passed
    pub fn is_certified(&self) -> bool {
        self.certified
    }

    /// Derive this participant's threshold key material; the round must be certified
    pub fn bls_keyring(&self) -> Result<BlsKeyring> {
        let own = self.index()?;
        if !self.certified {
            return Err(DkgError::NotCertified("responses not processed".to_string()));
        }
        let missing: Vec<u32> = self
            .all_indices()
            .filter(|dealer| !self.shares.contains_key(dealer))
            .collect();
        if !missing.is_empty() {
            return Err(DkgError::MissingDeals(missing));
        }
        let secret_share: Scalar = self.shares.values().sum();
        BlsKeyring::new(own, secret_share, self.public_polynomial()?)
    }

    fn all_indices(&self) -> impl Iterator<Item = u32> {
        (1..=self.participants.len()).filter_map(|position| u32::try_from(position).ok())
    }

    fn other_indices(&self, index: u32) -> impl Iterator<Item = u32> {
        self.all_indices().filter(move |other| *other != index)
    }
}

impl Drop for DkgInstance {
    fn drop(&mut self) {
        if let Some(dealing) = self.dealing.as_mut() {
            dealing.coefficients.iter_mut().for_each(|c| *c = Scalar::ZERO);
        }
        self.shares.values_mut().for_each(|share| *share = Scalar::ZERO);
    }
}

fn index_from_position(position: usize) -> Result<u32> {
    u32::try_from(position + 1).map_err(|_| DkgError::InvalidThreshold {
        threshold: 0,
        participants: position,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use rand::rngs::OsRng;

    fn round(n: usize, threshold: usize) -> Vec<DkgInstance> {
        let keys: Vec<KeyPair> = (0..n).map(|_| KeyPair::generate(&mut OsRng)).collect();
        keys.iter()
            .map(|own| {
                let mut instance = DkgInstance::new(*own.public());
                for (i, key) in keys.iter().enumerate() {
                    assert!(instance.store_pub_key(&format!("node-{i}"), *key.public()).unwrap());
                }
                instance.init_instance(threshold, &mut OsRng).unwrap();
                instance
            })
            .collect()
    }

    #[test]
    fn test_indices_follow_key_order() {
        let instances = round(3, 2);
        let mut indices: Vec<u32> = instances.iter().map(|i| i.index().unwrap()).collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![1, 2, 3]);
        for instance in &instances {
            let own = instance.index().unwrap();
            let name = instance.participant_at(own).unwrap().to_string();
            assert_eq!(instance.index_of(&name).unwrap(), own);
            assert_eq!(instance.deals().unwrap().len(), 2);
        }
    }

    #[test]
    fn test_store_pub_key_dedupes() {
        let a = KeyPair::generate(&mut OsRng);
        let b = KeyPair::generate(&mut OsRng);
        let mut instance = DkgInstance::new(*a.public());
        assert!(instance.store_pub_key("a", *a.public()).unwrap());
        assert!(!instance.store_pub_key("a", *a.public()).unwrap());
        assert_eq!(
            instance.store_pub_key("a", *b.public()),
            Err(DkgError::DuplicateParticipant("a".to_string()))
        );
        assert!(instance.store_pub_key("b", *a.public()).is_err());
    }

    #[test]
    fn test_init_requires_own_key_and_valid_threshold() {
        let a = KeyPair::generate(&mut OsRng);
        let b = KeyPair::generate(&mut OsRng);
        let mut instance = DkgInstance::new(*a.public());
        instance.store_pub_key("b", *b.public()).unwrap();
        assert!(matches!(
            instance.init_instance(1, &mut OsRng),
            Err(DkgError::UnknownParticipant(_))
        ));

        instance.store_pub_key("a", *a.public()).unwrap();
        assert!(matches!(
            instance.init_instance(3, &mut OsRng),
            Err(DkgError::InvalidThreshold { threshold: 3, participants: 2 })
        ));
        assert_eq!(instance.deals().err(), Some(DkgError::NotInitialized));

        instance.init_instance(2, &mut OsRng).unwrap();
        let late = KeyPair::generate(&mut OsRng);
        assert_eq!(
            instance.store_pub_key("late", *late.public()),
            Err(DkgError::AlreadyInitialized)
        );
        assert_eq!(instance.init_instance(2, &mut OsRng), Err(DkgError::AlreadyInitialized));
    }

    fn exchange_commits(instances: &mut [DkgInstance]) {
        let all_commits: Vec<(String, PublicPolynomial)> = instances
            .iter()
            .map(|i| (i.participant_at(i.index().unwrap()).unwrap().to_string(), i.commits().unwrap().clone()))
            .collect();
        for instance in instances.iter_mut() {
            for (name, commits) in &all_commits {
                instance.store_commits(name, commits.clone()).unwrap();
            }
        }
    }

    #[test]
    fn test_rejected_commitments_leave_nothing_stored() {
        let mut instances = round(3, 2);
        let named: Vec<(String, PublicPolynomial)> = instances
            .iter()
            .map(|i| (i.participant_at(i.index().unwrap()).unwrap().to_string(), i.commits().unwrap().clone()))
            .collect();
        let (first, second) = (&named[1], &named[2]);
        let target = &mut instances[0];

        let batch = vec![
            (first.0.as_str(), first.1.clone()),
            (second.0.as_str(), second.1.clone()),
            (first.0.as_str(), second.1.clone()),
        ];
        let index = target.index_of(&first.0).unwrap();
        assert_eq!(target.store_all_commits(batch), Err(DkgError::CommitmentMismatch(index)));
        assert!(target.distributed_public_key().is_err());

        let batch = vec![(first.0.as_str(), first.1.clone()), (second.0.as_str(), second.1.clone())];
        target.store_all_commits(batch).unwrap();
        assert!(target.distributed_public_key().is_ok());
        assert_eq!(
            target.store_commits(&first.0, second.1.clone()),
            Err(DkgError::CommitmentMismatch(index))
        );
    }

    #[test]
    fn test_keyring_requires_certification() {
        let mut instances = round(3, 2);
        exchange_commits(&mut instances);

        let mut inbox: BTreeMap<u32, Vec<Deal>> = BTreeMap::new();
        for instance in &instances {
            for (recipient, deal) in instance.deals().unwrap() {
                inbox.entry(recipient).or_default().push(deal);
            }
        }
        let mut responses = Vec::new();
        for instance in &mut instances {
            let own = instance.index().unwrap();
            let approvals = instance.process_deals(inbox.remove(&own).unwrap()).unwrap();
            responses.push((instance.participant_at(own).unwrap().to_string(), approvals));
        }

        let instance = &mut instances[0];
        assert!(!instance.is_certified());
        assert!(matches!(instance.bls_keyring(), Err(DkgError::NotCertified(_))));

        for (name, approvals) in &responses {
            instance.store_responses(name, approvals.clone()).unwrap();
        }
        instance.process_responses().unwrap();
        assert!(instance.is_certified());
        let keyring = instance.bls_keyring().unwrap();
        assert_eq!(keyring.index, instance.index().unwrap());

        let (name, approvals) = &responses[1];
        instance.store_responses(name, approvals.clone()).unwrap();
        assert!(!instance.is_certified());
    }

    #[test]
    fn test_missing_deal_aborts_without_recording() {
        let mut instances = round(3, 2);
        exchange_commits(&mut instances);

        let target = instances[0].index().unwrap();
        let one_deal: Vec<Deal> = instances[1].deals().unwrap().remove(&target).into_iter().collect();
        let err = instances[0].process_deals(one_deal).unwrap_err();
        assert!(matches!(err, DkgError::MissingDeals(ref missing) if missing.len() == 1));
        assert!(instances[0].bls_keyring().is_err());
    }
}
