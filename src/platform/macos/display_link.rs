//! =============================================================================
//! DISPLAY_LINK.RS - Source de rafraîchissement CVDisplayLink
//! DISPLAY_LINK.RS - CVDisplayLink refresh source
//! =============================================================================
//!
//! Le callback CVDisplayLink tourne sur un thread de CoreVideo; il se contente
//! de publier un tick via `TickSender`. La livraison aux abonnés se fait sur
//! le thread principal.
//! The CVDisplayLink callback runs on a CoreVideo thread; it only publishes
//! a tick through `TickSender`. Delivery to subscribers happens on the main
//! thread.

use std::ffi::c_void;
use std::ptr;

use log::{debug, warn};

use crate::error::FrameClockError;
use crate::frame_clock::{FrameTimestamps, RefreshSource, TickSender};

// =============================================================================
// FFI COREVIDEO
// COREVIDEO FFI
// =============================================================================

type CVDisplayLinkRef = *mut c_void;
type CVReturn = i32;

const K_CV_RETURN_SUCCESS: CVReturn = 0;

#[repr(C)]
#[derive(Clone, Copy)]
struct CVSMPTETime {
    subframes: i16,
    subframe_divisor: i16,
    counter: u32,
    kind: u32,
    flags: u32,
    hours: i16,
    minutes: i16,
    seconds: i16,
    frames: i16,
}

/// Mirror of CoreVideo's CVTimeStamp
#[repr(C)]
#[derive(Clone, Copy)]
struct CVTimeStamp {
    version: u32,
    video_time_scale: i32,
    video_time: i64,
    host_time: u64,
    rate_scalar: f64,
    video_refresh_period: i64,
    smpte_time: CVSMPTETime,
    flags: u64,
    reserved: u64,
}

type CVDisplayLinkOutputCallback = extern "C" fn(
    display_link: CVDisplayLinkRef,
    in_now: *const CVTimeStamp,
    in_output_time: *const CVTimeStamp,
    flags_in: u64,
    flags_out: *mut u64,
    context: *mut c_void,
) -> CVReturn;

#[link(name = "CoreVideo", kind = "framework")]
extern "C" {
    fn CVDisplayLinkCreateWithActiveCGDisplays(display_link_out: *mut CVDisplayLinkRef) -> CVReturn;
    fn CVDisplayLinkSetOutputCallback(
        display_link: CVDisplayLinkRef,
        callback: CVDisplayLinkOutputCallback,
        user_info: *mut c_void,
    ) -> CVReturn;
    fn CVDisplayLinkStart(display_link: CVDisplayLinkRef) -> CVReturn;
    fn CVDisplayLinkStop(display_link: CVDisplayLinkRef) -> CVReturn;
    fn CVDisplayLinkIsRunning(display_link: CVDisplayLinkRef) -> u8;
    fn CVDisplayLinkRelease(display_link: CVDisplayLinkRef);
}

/// Seconds represented by a CoreVideo timestamp
fn seconds(stamp: &CVTimeStamp) -> f64 {
    if stamp.video_time_scale == 0 {
        return 0.0;
    }
    stamp.video_time as f64 / stamp.video_time_scale as f64
}

/// Appelé par CoreVideo à chaque rafraîchissement (thread de CoreVideo)
/// Called by CoreVideo on every refresh (CoreVideo thread)
extern "C" fn display_link_callback(
    _display_link: CVDisplayLinkRef,
    in_now: *const CVTimeStamp,
    in_output_time: *const CVTimeStamp,
    _flags_in: u64,
    _flags_out: *mut u64,
    context: *mut c_void,
) -> CVReturn {
    if context.is_null() || in_now.is_null() || in_output_time.is_null() {
        return K_CV_RETURN_SUCCESS;
    }

    // SAFETY: `context` is the boxed sender owned by `DisplayLinkSource`,
    // which stops the link before dropping the box. The timestamps are valid
    // for the duration of the callback.
    let (sender, now, output) = unsafe {
        (
            &*(context as *const TickSender),
            &*in_now,
            &*in_output_time,
        )
    };

    sender.send(FrameTimestamps {
        now: seconds(now),
        output: seconds(output),
    });
    K_CV_RETURN_SUCCESS
}

// =============================================================================
// SOURCE
// =============================================================================

/// CVDisplayLink couvrant tous les écrans actifs
/// CVDisplayLink covering every active display
pub struct DisplayLinkSource {
    link: CVDisplayLinkRef,
    // Callback context; must stay at a stable address while the link lives
    _sender: Box<TickSender>,
}

impl DisplayLinkSource {
    /// Crée le display link
    /// Creates the link; no retry, the caller treats failure as fatal
    pub fn create(sender: TickSender) -> Result<Self, FrameClockError> {
        let mut link: CVDisplayLinkRef = ptr::null_mut();

        // SAFETY: `link` is a valid out pointer.
        let status = unsafe { CVDisplayLinkCreateWithActiveCGDisplays(&mut link) };
        if status != K_CV_RETURN_SUCCESS || link.is_null() {
            return Err(FrameClockError::SourceUnavailable(status));
        }

        let sender = Box::new(sender);
        let context = &*sender as *const TickSender as *mut c_void;

        // SAFETY: `link` was just created; `context` outlives the link (see Drop).
        let status = unsafe { CVDisplayLinkSetOutputCallback(link, display_link_callback, context) };
        if status != K_CV_RETURN_SUCCESS {
            // SAFETY: releases the link created above, never used again.
            unsafe { CVDisplayLinkRelease(link) };
            return Err(FrameClockError::SourceUnavailable(status));
        }

        debug!("CVDisplayLink created");
        Ok(Self {
            link,
            _sender: sender,
        })
    }
}

impl RefreshSource for DisplayLinkSource {
    fn start(&mut self) {
        // SAFETY: `self.link` is valid until Drop.
        let status = unsafe { CVDisplayLinkStart(self.link) };
        if status != K_CV_RETURN_SUCCESS {
            warn!("CVDisplayLinkStart failed ({})", status);
        }
    }

    fn stop(&mut self) {
        // SAFETY: `self.link` is valid until Drop.
        let status = unsafe { CVDisplayLinkStop(self.link) };
        if status != K_CV_RETURN_SUCCESS {
            warn!("CVDisplayLinkStop failed ({})", status);
        }
    }

    fn is_running(&self) -> bool {
        // SAFETY: `self.link` is valid until Drop.
        unsafe { CVDisplayLinkIsRunning(self.link) != 0 }
    }
}

impl Drop for DisplayLinkSource {
    fn drop(&mut self) {
        // SAFETY: the link is stopped before release, so the callback no
        // longer reads the sender once it is freed.
        unsafe {
            if CVDisplayLinkIsRunning(self.link) != 0 {
                CVDisplayLinkStop(self.link);
            }
            CVDisplayLinkRelease(self.link);
        }
    }
}
