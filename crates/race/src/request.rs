//! Builds the normalized request template for a (connection, car, test)
//! triple; the tool loop then clones its `messages` into a mutable
//! conversation as it appends assistant/tool turns.

use provider::{NormalizedMessage, NormalizedRequest};
use store::{Car, Test};

/// Normalizes `test`'s prompt and `car`'s sampling configuration into a
/// request ready for [`provider::generate`].
pub fn build_request(car: &Car, test: &Test) -> NormalizedRequest {
    let mut messages = Vec::new();
    if let Some(system_prompt) = &test.system_prompt {
        messages.push(NormalizedMessage::system(system_prompt.clone()));
    }
    messages.push(NormalizedMessage::user(test.user_prompt.clone()));

    let mut request = NormalizedRequest::new(car.model_name.clone(), messages);
    request.temperature = car.temperature;
    request.top_p = car.top_p;
    request.max_tokens = car.max_tokens;
    request.seed = car.seed;
    request.stop = car.stop.clone();
    request.tools = test.tools_schema.clone();
    request
}
