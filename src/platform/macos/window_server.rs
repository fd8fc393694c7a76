//! =============================================================================
//! WINDOW_SERVER.RS - Accès au serveur de fenêtres
//! WINDOW_SERVER.RS - Window server access
//! =============================================================================
//!
//! `ScreenBackend` sur Core Graphics et AppKit: écrans, liste des fenêtres,
//! composition d'un ensemble de fenêtres et position de la souris.
//! `ScreenBackend` on top of Core Graphics and AppKit: displays, window
//! list, compositing of a window set and mouse location.

use std::ffi::c_void;

use core_foundation::array::CFArray;
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::event::CGEvent;
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::image::CGImage;
use core_graphics::window::{
    copy_window_info, create_image_from_array, kCGNullWindowID, kCGWindowImageDefault,
    kCGWindowLayer, kCGWindowListOptionOnScreenOnly, kCGWindowName, kCGWindowNumber,
};
use image::{Rgba, RgbaImage};
use log::{trace, warn};
use objc2::msg_send;
use objc2::rc::Retained;
use objc2_app_kit::NSScreen;
use objc2_foundation::{MainThreadMarker, NSNumber, NSRect, NSString};

use crate::capture::{ScreenBackend, WindowInfo};
use crate::coords::{self, DisplayDescriptor};
use crate::geometry::{Point, Rect};

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    /// macOS 10.15+: true once screen recording has been granted
    fn CGPreflightScreenCaptureAccess() -> bool;
}

/// CGDirectDisplayID de l'écran, lu dans `NSScreenNumber`
/// CGDirectDisplayID of the screen, read from `NSScreenNumber`
fn screen_number(screen: &NSScreen) -> Option<u32> {
    // SAFETY: read-only property of a live screen.
    let description = unsafe { screen.deviceDescription() };
    let key = NSString::from_str("NSScreenNumber");
    let value = description.objectForKey(&key)?;
    let number = value.downcast::<NSNumber>().ok()?;
    Some(number.unsignedIntValue())
}

/// Identifiant d'écran stable si possible
/// Stable id when AppKit provides one, enumeration order otherwise
fn display_id(screen_number: Option<u32>, index: usize) -> u32 {
    screen_number
        .filter(|&number| number != 0)
        .unwrap_or(index as u32 + 1)
}

/// Serveur de fenêtres macOS (thread principal uniquement)
/// macOS window server (main thread only)
pub struct WindowServer {
    mtm: MainThreadMarker,
}

impl WindowServer {
    pub fn new(mtm: MainThreadMarker) -> Self {
        Self { mtm }
    }
}

impl ScreenBackend for WindowServer {
    fn displays(&self) -> Vec<DisplayDescriptor> {
        let screens = NSScreen::screens(self.mtm);
        let count: usize = screens.count();
        let mut displays = Vec::with_capacity(count);

        for i in 0..count {
            // SAFETY: `i` is within the array bounds.
            let screen: Retained<NSScreen> = unsafe { msg_send![&*screens, objectAtIndex: i] };
            let frame: NSRect = screen.frame();
            displays.push(DisplayDescriptor::new(
                display_id(screen_number(&screen), i),
                Rect::new(frame.origin.x, frame.origin.y, frame.size.width, frame.size.height),
                screen.backingScaleFactor(),
            ));
        }
        displays
    }

    fn on_screen_windows(&self) -> Vec<WindowInfo> {
        let Some(list) = copy_window_info(kCGWindowListOptionOnScreenOnly, kCGNullWindowID) else {
            warn!("CGWindowListCopyWindowInfo returned nothing");
            return Vec::new();
        };

        // SAFETY: the key constants are static CFStrings owned by Core Graphics.
        let (number_key, layer_key, name_key) = unsafe {
            (
                CFString::wrap_under_get_rule(kCGWindowNumber),
                CFString::wrap_under_get_rule(kCGWindowLayer),
                CFString::wrap_under_get_rule(kCGWindowName),
            )
        };

        let mut windows = Vec::with_capacity(list.len() as usize);
        for item in list.iter() {
            // SAFETY: every entry of the window list is a CFDictionary.
            let info: CFDictionary<CFString, CFType> =
                unsafe { CFDictionary::wrap_under_get_rule(*item as CFDictionaryRef) };

            let number = info
                .find(&number_key)
                .and_then(|value| value.downcast::<CFNumber>())
                .and_then(|number| number.to_i64());
            let Some(number) = number else {
                continue;
            };
            let layer = info
                .find(&layer_key)
                .and_then(|value| value.downcast::<CFNumber>())
                .and_then(|layer| layer.to_i64())
                .unwrap_or(0);
            let name = info
                .find(&name_key)
                .and_then(|value| value.downcast::<CFString>())
                .map(|name| name.to_string());

            windows.push(WindowInfo {
                id: number as u32,
                layer: layer as i32,
                name,
            });
        }
        windows
    }

    fn composite(&self, rect: Rect, windows: &[u32]) -> Option<RgbaImage> {
        if windows.is_empty() {
            return None;
        }

        // Core Graphics wants the list front to back
        let ids: Vec<*const c_void> = windows
            .iter()
            .rev()
            .map(|&id| id as usize as *const c_void)
            .collect();
        let array = CFArray::from_copyable(&ids);

        let bounds = CGRect::new(
            &CGPoint::new(rect.origin.x, rect.origin.y),
            &CGSize::new(rect.size.width, rect.size.height),
        );
        let image = create_image_from_array(bounds, array, kCGWindowImageDefault)?;
        trace!("Composited {} windows into {}x{}", windows.len(), image.width(), image.height());
        to_rgba(&image)
    }

    fn mouse_location(&self) -> Point {
        let Ok(source) = CGEventSource::new(CGEventSourceStateID::HIDSystemState) else {
            return Point::default();
        };
        let Ok(event) = CGEvent::new(source) else {
            return Point::default();
        };

        // CGEvent reports global points with a top-left origin
        let location = event.location();
        let displays = self.displays();
        match coords::primary_display(&displays) {
            Some(primary) => coords::flip(Point::new(location.x, location.y), &primary.frame),
            None => Point::new(location.x, location.y),
        }
    }

    fn screen_capture_access(&self) -> Option<bool> {
        // SAFETY: no arguments, no side effect beyond reading the TCC state.
        Some(unsafe { CGPreflightScreenCaptureAccess() })
    }
}

// =============================================================================
// CONVERSION BGRA -> RGBA
// BGRA -> RGBA CONVERSION
// =============================================================================

/// Copie une image BGRA 32 bits dans un tampon RGBA
/// Copies a 32-bit BGRA window-server image into an RGBA buffer
fn to_rgba(image: &CGImage) -> Option<RgbaImage> {
    if image.bits_per_pixel() != 32 {
        warn!("Unsupported capture format: {} bits per pixel", image.bits_per_pixel());
        return None;
    }

    let width = image.width();
    let height = image.height();
    let bytes_per_row = image.bytes_per_row();
    let data = image.data();
    let bytes = data.bytes();

    if bytes.len() < bytes_per_row * height {
        return None;
    }

    let mut out = RgbaImage::new(width as u32, height as u32);
    for y in 0..height {
        let row = &bytes[y * bytes_per_row..];
        for x in 0..width {
            let offset = x * 4;
            out.put_pixel(
                x as u32,
                y as u32,
                Rgba([row[offset + 2], row[offset + 1], row[offset], 255]),
            );
        }
    }
    Some(out)
}

// =============================================================================
// TESTS
// =============================================================================
