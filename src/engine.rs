//! Action execution: single replies, multi-value replies, list actions.
//!
//! Every call tags its command with an `ActionID` (a random UUID unless the
//! caller set one) and registers with the session's correlator before the
//! frame is written, so a fast reply cannot slip past. List actions add a
//! private event subscription that only accepts frames carrying the same
//! `ActionID`, or none at all.
//!
//! All calls take a [`CancellationToken`]; cancelling it unblocks the wait
//! and yields [`AmiError::Cancelled`]. A session closed by the client also
//! yields `Cancelled`; one whose connection dropped yields
//! [`AmiError::Network`].

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    command::Command,
    correlator::PendingReply,
    error::{AmiError, AmiResult, ListError},
    message::{AmiMessage, MultiReply},
    retry::with_retry,
    session::AmiSession,
};

async fn wait_reply(pending: &mut Option<PendingReply>) -> Option<AmiMessage> {
    match pending {
        Some(p) => p
            .recv()
            .await,
        None => std::future::pending().await,
    }
}

fn matches_any(names: &[&str], event: &str) -> bool {
    names
        .iter()
        .any(|n| n.eq_ignore_ascii_case(event))
}

/// Send `command` and wait for its reply.
///
/// The reply is returned whatever its `Response` value; use
/// [`AmiMessage::into_result`] to turn `Response: Error` into an error.
pub async fn single(
    cancel: &CancellationToken,
    session: &AmiSession,
    mut command: Command,
) -> AmiResult<AmiMessage> {
    let action_id = command
        .ensure_action_id()
        .to_string();
    let mut pending = session
        .correlator()
        .register(&action_id)
        .map_err(|_| session.closed_error())?;

    session
        .write_command(&command)
        .await?;
    debug!("[ENGINE] {} sent as {}", command.action_name(), action_id);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AmiError::Cancelled),
        reply = pending.recv() => reply.ok_or_else(|| session.closed_error()),
    }
}

/// [`single`] under the session's retry policy.
///
/// Each attempt is a new request; an auto-assigned `ActionID` is fresh per
/// attempt.
pub async fn single_with_retry(
    cancel: &CancellationToken,
    session: &AmiSession,
    command: Command,
) -> AmiResult<AmiMessage> {
    let policy = session.retry_policy();
    with_retry(&policy, move |attempt| {
        trace!("[ENGINE] {} attempt {}", command.action_name(), attempt);
        let command = command.clone();
        async move { single(cancel, session, command).await }
    })
    .await
}

/// [`single`], with the reply folded into a multi-value map.
pub async fn multi(
    cancel: &CancellationToken,
    session: &AmiSession,
    command: Command,
) -> AmiResult<MultiReply> {
    single(cancel, session, command)
        .await
        .map(AmiMessage::into_multi)
}

/// Run a list-style action.
///
/// Collects every event named in `accepted`, in arrival order, until an
/// event named in `terminal` arrives. Event names compare
/// case-insensitively.
///
/// Failures carry what was collected so far in [`ListError::partial`],
/// except a non-success `Response`, which yields an empty list and
/// [`AmiError::Server`].
///
/// ```rust,no_run
/// # use asterisk_ami_tokio::{engine, AmiSession, Command};
/// # use tokio_util::sync::CancellationToken;
/// # async fn run(session: AmiSession) -> Result<(), asterisk_ami_tokio::ListError> {
/// let peers = engine::list(
///     &CancellationToken::new(),
///     &session,
///     Command::new("SIPpeers"),
///     &["PeerEntry"],
///     &["PeerlistComplete"],
/// )
/// .await?;
/// for peer in &peers {
///     println!("{} {}", peer.get("ObjectName"), peer.get("Status"));
/// }
/// # Ok(())
/// # }
/// ```
pub async fn list(
    cancel: &CancellationToken,
    session: &AmiSession,
    mut command: Command,
    accepted: &[&str],
    terminal: &[&str],
) -> Result<Vec<AmiMessage>, ListError> {
    let action_id = command
        .ensure_action_id()
        .to_string();

    let sink = session
        .bus()
        .subscribe_many(
            accepted
                .iter()
                .chain(terminal),
        )
        .ok_or_else(|| ListError {
            partial: Vec::new(),
            source: session.closed_error(),
        })?;
    let mut pending = Some(
        session
            .correlator()
            .register(&action_id)
            .map_err(|_| ListError {
                partial: Vec::new(),
                source: session.closed_error(),
            })?,
    );

    if let Err(source) = session
        .write_command(&command)
        .await
    {
        return Err(ListError {
            partial: Vec::new(),
            source,
        });
    }
    debug!("[ENGINE] list {} sent as {}", command.action_name(), action_id);

    let mut items = Vec::new();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ListError {
                    partial: items,
                    source: AmiError::Cancelled,
                });
            }
            reply = wait_reply(&mut pending), if pending.is_some() => {
                pending = None;
                match reply {
                    Some(reply) if reply.is_success() => {
                        trace!("[ENGINE] list {} accepted", action_id);
                    }
                    Some(reply) => {
                        return Err(ListError {
                            partial: Vec::new(),
                            source: AmiError::from_reply(&reply),
                        });
                    }
                    None => {
                        return Err(ListError {
                            partial: items,
                            source: session.closed_error(),
                        });
                    }
                }
            }
            frame = sink.recv() => {
                let Some(frame) = frame else {
                    return Err(ListError {
                        partial: items,
                        source: session.closed_error(),
                    });
                };
                if frame
                    .action_id()
                    .is_some_and(|id| id != action_id)
                {
                    continue;
                }
                let Some(name) = frame.event_name() else {
                    continue;
                };
                if matches_any(terminal, name) {
                    debug!("[ENGINE] list {} complete with {} item(s)", action_id, items.len());
                    return Ok(items);
                }
                if matches_any(accepted, name) {
                    items.push(frame);
                }
            }
        }
    }
}
