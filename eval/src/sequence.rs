// SPDX-License-Identifier: MIT

//! Observable step-by-step provisioning sequences.
//!
//! Each step reports its name and raw capture to the observer, which may
//! stop the sequence by returning `false`. These exist for evaluation
//! runs that need to pause, inspect or perturb a drive between steps;
//! production provisioning belongs in the SSC wrapper crates.

use std::sync::Arc;

use sed_call::error::{Result, SedError};
use sed_call::session::Session;
use sed_call::transport::Transport;
use sed_call::uid;

use crate::raw::RawResult;
use crate::security;
use crate::{opal, session as eval_session};

/// Per-step callback: (step name, raw capture) -> continue?
pub type StepObserver<'a> = &'a mut dyn FnMut(&str, &RawResult) -> bool;

fn notify(observer: &mut Option<StepObserver<'_>>, step: &str, raw: &RawResult) -> bool {
    match observer {
        Some(callback) => callback(step, raw),
        None => true,
    }
}

fn reborrow<'a>(observer: &'a mut Option<StepObserver<'_>>) -> Option<StepObserver<'a>> {
    match observer {
        Some(callback) => Some(&mut **callback),
        None => None,
    }
}

/// Take ownership of the drive: read the MSID credential and set the SID
/// PIN to `new_sid_password`.
///
/// Steps: discovery, properties, MSID session + C_PIN read, SID session
/// authenticated with the MSID credential, C_PIN(SID) write.
///
/// # Errors
///
/// The first failing step's error; `SedError::InternalError` when the
/// observer stops the sequence.
pub fn take_ownership(
    transport: &Arc<dyn Transport>,
    com_id: u16,
    new_sid_password: &str,
    mut observer: Option<StepObserver<'_>>,
) -> Result<()> {
    let info = crate::discovery::discovery0_parsed(transport);
    if !notify(&mut observer, "discovery0", &info.raw) {
        return Err(SedError::InternalError);
    }
    info.raw.outcome()?;

    let props = eval_session::exchange_properties(transport, com_id);
    if !notify(&mut observer, "exchangeProperties", &props.raw) {
        return Err(SedError::InternalError);
    }
    props.raw.outcome()?;
    let max_com_packet = props.tper.map_or(2048, |p| p.max_com_packet_size);

    // Read the manufactured default credential.
    let mut msid_session = Session::new(Arc::clone(transport), com_id);
    msid_session.set_max_com_packet_size(max_com_packet);
    let started = eval_session::start_session(&mut msid_session, uid::SP_ADMIN, false);
    if !notify(&mut observer, "startSession(AdminSP, read)", &started.raw) {
        return Err(SedError::InternalError);
    }
    started.raw.outcome()?;

    let msid = opal::get_c_pin(&mut msid_session, uid::C_PIN_MSID);
    let keep_going = notify(&mut observer, "getCPin(MSID)", &msid.raw);
    let _ = msid_session.close_session();
    if !keep_going {
        return Err(SedError::InternalError);
    }
    msid.raw.outcome()?;
    let msid_pin = msid.value.ok_or(SedError::MalformedResponse)?;

    // Authenticate as SID with the MSID credential and set the new PIN.
    let mut sid_session = Session::new(Arc::clone(transport), com_id);
    sid_session.set_max_com_packet_size(max_com_packet);
    let started = eval_session::start_session_with_auth(
        &mut sid_session,
        uid::SP_ADMIN,
        true,
        uid::AUTH_SID,
        &msid_pin,
    );
    if !notify(&mut observer, "startSessionWithAuth(AdminSP, SID)", &started.raw) {
        return Err(SedError::InternalError);
    }
    started.raw.outcome()?;

    let set = opal::set_c_pin_password(&mut sid_session, uid::C_PIN_SID, new_sid_password);
    let keep_going = notify(&mut observer, "setCPin(SID)", &set);
    let _ = sid_session.close_session();
    if !keep_going {
        return Err(SedError::InternalError);
    }
    set.outcome()
}

/// Full Opal provisioning: take ownership, activate the Locking SP, set
/// Admin1 and User1 credentials, enable User1 and arm the global range.
///
/// # Errors
///
/// As [`take_ownership`], plus the activation and Locking SP step
/// errors.
pub fn full_opal_setup(
    transport: &Arc<dyn Transport>,
    com_id: u16,
    sid_password: &str,
    admin1_password: &str,
    user1_password: &str,
    mut observer: Option<StepObserver<'_>>,
) -> Result<()> {
    take_ownership(transport, com_id, sid_password, reborrow(&mut observer))?;

    let props = eval_session::exchange_properties(transport, com_id);
    if !notify(&mut observer, "exchangeProperties(refresh)", &props.raw) {
        return Err(SedError::InternalError);
    }
    props.raw.outcome()?;
    let max_com_packet = props.tper.map_or(2048, |p| p.max_com_packet_size);
    let sid_credential = security::password_to_bytes(sid_password);

    // Activate the Locking SP from an SID session on the Admin SP.
    let mut admin_session = Session::new(Arc::clone(transport), com_id);
    admin_session.set_max_com_packet_size(max_com_packet);
    let started = eval_session::start_session_with_auth(
        &mut admin_session,
        uid::SP_ADMIN,
        true,
        uid::AUTH_SID,
        &sid_credential,
    );
    if !notify(&mut observer, "startSessionWithAuth(AdminSP, SID)", &started.raw) {
        return Err(SedError::InternalError);
    }
    started.raw.outcome()?;

    let activated = opal::activate(&mut admin_session, uid::SP_LOCKING);
    let keep_going = notify(&mut observer, "activate(LockingSP)", &activated);
    let _ = admin_session.close_session();
    if !keep_going {
        return Err(SedError::InternalError);
    }
    activated.outcome()?;

    // Provision the Locking SP as Admin1 (credential inherits from SID
    // on activation).
    let mut lock_session = Session::new(Arc::clone(transport), com_id);
    lock_session.set_max_com_packet_size(max_com_packet);
    let started = eval_session::start_session_with_auth(
        &mut lock_session,
        uid::SP_LOCKING,
        true,
        uid::AUTH_ADMIN1,
        &sid_credential,
    );
    if !notify(&mut observer, "startSessionWithAuth(LockingSP, Admin1)", &started.raw) {
        return Err(SedError::InternalError);
    }
    started.raw.outcome()?;

    type Step = (&'static str, fn(&mut Session, &str, &str) -> RawResult);
    let steps: [Step; 4] = [
        ("setCPin(Admin1)", |s, admin1, _| {
            opal::set_c_pin_password(s, uid::C_PIN_ADMIN1, admin1)
        }),
        ("setAuthorityEnabled(User1)", |s, _, _| opal::enable_user(s, 1)),
        ("setCPin(User1)", |s, _, user1| {
            opal::set_c_pin_password(s, uid::c_pin_user(1), user1)
        }),
        ("setRange(GlobalRange)", |s, _, _| {
            opal::set_range(s, 0, 0, 0, true, true)
        }),
    ];

    for (step, run) in steps {
        let raw = run(&mut lock_session, admin1_password, user1_password);
        if !notify(&mut observer, step, &raw) {
            let _ = lock_session.close_session();
            return Err(SedError::InternalError);
        }
        if let Err(err) = raw.outcome() {
            let _ = lock_session.close_session();
            return Err(err);
        }
    }

    let _ = lock_session.close_session();
    Ok(())
}
