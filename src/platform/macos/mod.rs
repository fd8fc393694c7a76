//! =============================================================================
//! Interface macOS
//! macOS shell
//! =============================================================================
//!
//! Crée la fenêtre de la loupe, branche le contrôleur et fait tourner la
//! boucle d'événements. Le contrôleur vit dans un thread-local du thread
//! principal; la vue y accède via `with_controller`.
//! Creates the magnifier window, wires the controller and runs the event
//! loop. The controller lives in a main-thread thread-local; the view
//! reaches it through `with_controller`.

mod display_link;
mod icc;
mod view;
mod window_server;

pub use display_link::DisplayLinkSource;
pub use icc::SystemColorSpaces;
pub use view::MagnifierView;
pub use window_server::WindowServer;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use objc2::rc::{Allocated, Retained};
use objc2::runtime::Bool;
use objc2::{msg_send, ClassType};
use objc2_app_kit::{
    NSApplication, NSApplicationActivationOptions, NSApplicationActivationPolicy, NSEventMask,
    NSRunningApplication, NSView, NSWindow, NSWindowOcclusionState, NSWindowStyleMask,
};
use objc2_foundation::{MainThreadMarker, NSDate, NSDefaultRunLoopMode, NSPoint, NSRect, NSSize, NSString};

use crate::capture::ScreenBackend;
use crate::config::{EVENT_LOOP_TIMEOUT_SECS, WINDOW_DEFAULT_SIZE, WINDOW_MIN_SIZE, WINDOW_TITLE};
use crate::controller::MagnifierController;
use crate::error::FrameClockError;
use crate::frame_clock::FrameClock;
use crate::geometry::Rect;
use crate::preferences::{self, PreferencesStore};

// =============================================================================
// ÉTAT GLOBAL
// GLOBAL STATE
// =============================================================================

/// Flag d'arrêt de la boucle d'événements
/// Event loop stop flag
static SHOULD_STOP: AtomicBool = AtomicBool::new(false);

/// NSNormalWindowLevel / NSFloatingWindowLevel
const NORMAL_WINDOW_LEVEL: isize = 0;
const FLOATING_WINDOW_LEVEL: isize = 3;

/// NSBackingStoreBuffered
const NS_BACKING_STORE_BUFFERED: u64 = 2;

thread_local! {
    static CONTROLLER: RefCell<Option<MagnifierController>> = const { RefCell::new(None) };
}

/// Exécute `f` avec le contrôleur, `None` s'il est absent ou déjà emprunté
/// Runs `f` with the controller; `None` when absent or already borrowed
pub(crate) fn with_controller<R>(f: impl FnOnce(&mut MagnifierController) -> R) -> Option<R> {
    CONTROLLER.with(|cell| {
        let mut slot = cell.try_borrow_mut().ok()?;
        slot.as_mut().map(f)
    })
}

/// Demande l'arrêt de la boucle d'événements
/// Asks the event loop to stop
pub(crate) fn stop_application() {
    SHOULD_STOP.store(true, Ordering::SeqCst);
}

pub(crate) fn apply_window_level(window: &NSWindow, floating: bool) {
    window.setLevel(if floating {
        FLOATING_WINDOW_LEVEL
    } else {
        NORMAL_WINDOW_LEVEL
    });
}

fn to_rect(rect: NSRect) -> Rect {
    Rect::new(rect.origin.x, rect.origin.y, rect.size.width, rect.size.height)
}

// =============================================================================
// POINT D'ENTRÉE
// ENTRY POINT
// =============================================================================

/// Lance la loupe et bloque jusqu'à la fermeture de la fenêtre ou Échap
/// Runs the magnifier until its window is closed or Escape is pressed
pub fn run() -> Result<(), FrameClockError> {
    SHOULD_STOP.store(false, Ordering::SeqCst);

    let mtm = MainThreadMarker::new().expect("Must be called from main thread");
    let app = NSApplication::sharedApplication(mtm);
    app.setActivationPolicy(NSApplicationActivationPolicy::Regular);

    let preferences = Rc::new(PreferencesStore::open_default());
    let clock = Rc::new(FrameClock::new(DisplayLinkSource::create)?);
    let backend: Rc<dyn ScreenBackend> = Rc::new(WindowServer::new(mtm));

    // -------------------------------------------------------------------------
    // Fenêtre / Window
    // -------------------------------------------------------------------------
    let content_rect = NSRect::new(
        NSPoint::new(0.0, 0.0),
        NSSize::new(WINDOW_DEFAULT_SIZE, WINDOW_DEFAULT_SIZE),
    );
    let window: Retained<NSWindow> = unsafe {
        let allocated: Allocated<NSWindow> = mtm.alloc();
        msg_send![
            allocated,
            initWithContentRect: content_rect,
            styleMask: NSWindowStyleMask::Titled
                | NSWindowStyleMask::Closable
                | NSWindowStyleMask::Miniaturizable
                | NSWindowStyleMask::Resizable,
            backing: NS_BACKING_STORE_BUFFERED,
            defer: Bool::NO
        ]
    };
    unsafe { window.setReleasedWhenClosed(false) };
    window.setTitle(&NSString::from_str(WINDOW_TITLE));
    window.setContentMinSize(NSSize::new(WINDOW_MIN_SIZE, WINDOW_MIN_SIZE));
    apply_window_level(&window, preferences.get(&preferences::FLOATING_MAGNIFIER_WINDOW));
    window.center();

    let view: Retained<MagnifierView> = {
        let allocated: Allocated<MagnifierView> = mtm.alloc();
        unsafe { msg_send![allocated, initWithFrame: content_rect] }
    };
    let view_as_nsview: &NSView = &view;

    // -------------------------------------------------------------------------
    // Contrôleur / Controller
    // -------------------------------------------------------------------------
    let controller = MagnifierController::new(
        clock,
        backend,
        preferences,
        to_rect(view_as_nsview.bounds()),
        window.backingScaleFactor(),
    );
    controller.set_excluded_window(Some(window.windowNumber() as u32));
    controller.set_color_spaces(Rc::new(SystemColorSpaces));
    CONTROLLER.with(|cell| *cell.borrow_mut() = Some(controller));

    window.setContentView(Some(view_as_nsview));
    window.makeKeyAndOrderFront(None);
    window.makeFirstResponder(Some(view_as_nsview));

    NSRunningApplication::currentApplication().activateWithOptions(NSApplicationActivationOptions::empty());
    info!("Magnifier window open");

    // -------------------------------------------------------------------------
    // Boucle d'événements personnalisée
    // Custom event loop
    // -------------------------------------------------------------------------
    while !SHOULD_STOP.load(Ordering::SeqCst) {
        let timeout: Retained<NSDate> = unsafe {
            msg_send![NSDate::class(), dateWithTimeIntervalSinceNow: EVENT_LOOP_TIMEOUT_SECS]
        };
        let event = unsafe {
            app.nextEventMatchingMask_untilDate_inMode_dequeue(
                NSEventMask::Any,
                Some(&timeout),
                NSDefaultRunLoopMode,
                true,
            )
        };
        if let Some(event) = event {
            app.sendEvent(&event);
        }
        app.updateWindows();

        let miniaturized = window.isMiniaturized();
        if !window.isVisible() && !miniaturized {
            // Closed by the user
            break;
        }

        let visible = !miniaturized && window.occlusionState().contains(NSWindowOcclusionState::Visible);
        let bounds = to_rect(view_as_nsview.bounds());
        let scale = window.backingScaleFactor();

        let delivered = with_controller(|controller| {
            controller.set_visible(visible);
            controller.set_bounds(bounds, scale);
            controller.tick()
        })
        .unwrap_or(false);

        // The controller borrow is released before drawing
        if delivered {
            view_as_nsview.setNeedsDisplay(true);
            view_as_nsview.displayIfNeeded();
        }
    }

    window.orderOut(None);
    CONTROLLER.with(|cell| cell.borrow_mut().take());
    info!("Magnifier closed");
    Ok(())
}
