//! Hand-off of offline work to the air-gapped executor.

use crate::error::Result;
use crate::responses::Response;
use crate::states::State;
use crate::types::Operation;

/// True if landing in `state` calls for executor work
pub fn requires_operation(state: State) -> bool {
    matches!(
        state,
        State::DkgCommitsAwaitConfirmations
            | State::DkgDealsAwaitConfirmations
            | State::DkgResponsesAwaitConfirmations
            | State::DkgMasterKeyAwaitConfirmations
            | State::SigningAwaitPartialSigns
    )
}

/// Operation for a step that entered `state` with `response`.
///
/// Steps that stay inside a stage produce no response and therefore no
/// operation.
pub fn build_operation(dkg_round_id: &str, state: State, response: Option<&Response>) -> Result<Option<Operation>> {
    match response {
        Some(response) if requires_operation(state) => Ok(Some(Operation::new(
            dkg_round_id,
            state,
            response.to_payload()?,
        ))),
        _ => Ok(None),
    }
}
