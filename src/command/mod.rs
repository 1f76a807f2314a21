//! Command records: the unit of work tracked by the send engine (§3, §4.3).

mod tag;

pub use tag::TagGenerator;

use std::collections::{HashMap, HashSet};

use tokio::sync::oneshot;

use crate::compiler::Request;
use crate::dispatcher::DispatchedResponse;

/// The final outcome handed to a command's completion: the tagged response
/// that closed it, augmented with any collected untagged payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// The tagged response that completed the command.
    pub tagged: DispatchedResponse,
    /// Untagged responses collected per `accept_untagged`, in arrival order.
    pub payload: HashMap<String, Vec<DispatchedResponse>>,
}

/// Handle returned by [`crate::engine::Client::enqueue`]; resolves once the
/// command reaches its terminal outcome.
pub type Completion = oneshot::Receiver<crate::Result<CommandOutcome>>;

/// Options accepted alongside a request when enqueuing a command.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Untagged command names whose responses should be collected into
    /// this command's payload.
    pub accept_untagged: HashSet<String>,
    /// If the server answers `NO`/`BAD` before all literal chunks have
    /// been sent, whether an empty line must still be sent to complete
    /// the exchange (used by SASL-style continuations).
    pub error_response_expects_empty_line: bool,
}

/// One enqueued command, tracked from send until its tagged response.
pub struct CommandRecord {
    /// The tag assigned to this command (`W<n>`).
    pub tag: String,
    /// The request handed to the compiler.
    pub request: Request,
    /// Untagged names accepted into `payload`.
    pub accept_untagged: HashSet<String>,
    /// Collected untagged responses, one bucket per accepted name.
    pub payload: HashMap<String, Vec<DispatchedResponse>>,
    /// Compiled chunks awaiting transmission; `data[0]` has already been
    /// sent once this record becomes current.
    pub data: Vec<Vec<u8>>,
    /// Index of the next chunk continuation will release.
    pub next_chunk: usize,
    /// See [`EnqueueOptions::error_response_expects_empty_line`].
    pub error_response_expects_empty_line: bool,
    /// Resolved exactly once, with the terminal outcome or a fatal error.
    pub completion: oneshot::Sender<crate::Result<CommandOutcome>>,
}

impl CommandRecord {
    /// Creates a payload bucket for every accepted untagged name.
    #[must_use]
    pub fn new(
        tag: String,
        request: Request,
        options: EnqueueOptions,
        completion: oneshot::Sender<crate::Result<CommandOutcome>>,
    ) -> Self {
        let payload = options
            .accept_untagged
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();

        Self {
            tag,
            request,
            accept_untagged: options.accept_untagged,
            payload,
            data: Vec::new(),
            next_chunk: 0,
            error_response_expects_empty_line: options.error_response_expects_empty_line,
            completion,
        }
    }

    /// Whether there remain compiled chunks this command hasn't sent yet.
    #[must_use]
    pub fn has_remaining_chunks(&self) -> bool {
        self.next_chunk < self.data.len()
    }
}
