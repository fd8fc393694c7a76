//! =============================================================================
//! VIEW.RS - Vue de la loupe
//! VIEW.RS - Magnifier view
//! =============================================================================
//!
//! NSView qui dessine la dernière frame de la surface (bitmap, grille,
//! hot spot, valeurs lues) et transmet clavier et molette au contrôleur.
//! NSView that draws the surface's last frame (bitmap, grid, hot spot,
//! readouts) and forwards keyboard and scroll wheel to the controller.

use std::sync::Arc;

use core_graphics::base::{kCGImageAlphaNoneSkipLast, kCGRenderingIntentDefault};
use core_graphics::color_space::CGColorSpace;
use core_graphics::data_provider::CGDataProvider;
use core_graphics::image::CGImage;
use image::RgbaImage;
use objc2::encode::{Encoding, RefEncode};
use objc2::rc::Retained;
use objc2::runtime::AnyObject;
use objc2::{define_class, msg_send, ClassType, MainThreadOnly};
use objc2_app_kit::{
    NSBezierPath, NSColor, NSEvent, NSEventModifierFlags, NSFont, NSGraphicsContext, NSImage,
    NSImageInterpolation, NSStringDrawing, NSView,
};
use objc2_foundation::{NSDictionary, NSPoint, NSRect, NSSize, NSString};

use crate::config::{READOUT_FONT_SIZE, READOUT_PADDING};
use crate::controller::MagnifierController;
use crate::geometry::Rect;
use crate::readout::ColorReadout;
use crate::surface::MagnifierLayout;

/// Touche Échap
/// Escape key code
const KEY_CODE_ESCAPE: u16 = 53;

/// NSCompositingOperationSourceOver
const NS_COMPOSITING_OPERATION_SOURCE_OVER: usize = 2;

// =============================================================================
// CLASSE OBJECTIVE-C
// OBJECTIVE-C CLASS
// =============================================================================

define_class!(
    // SAFETY:
    // - The superclass NSView does not have any subclassing requirements that we violate.
    // - MagnifierView does not implement Drop.
    #[unsafe(super = NSView)]
    #[thread_kind = MainThreadOnly]
    #[name = "PixieMagnifierView"]

    /// Vue de contenu de la fenêtre de la loupe
    /// Content view of the magnifier window
    pub struct MagnifierView;

    impl MagnifierView {
        #[unsafe(method(acceptsFirstResponder))]
        fn accepts_first_responder(&self) -> bool {
            true
        }

        #[unsafe(method(keyDown:))]
        fn key_down(&self, event: &NSEvent) {
            let key_code = event.keyCode();
            if key_code == KEY_CODE_ESCAPE {
                super::stop_application();
                return;
            }

            let characters = unsafe { event.charactersIgnoringModifiers() }
                .map(|characters| characters.to_string())
                .unwrap_or_default();
            let shift = event.modifierFlags().contains(NSEventModifierFlags::Shift);

            let action = super::with_controller(|controller| handle_key(controller, &characters, shift))
                .unwrap_or(KeyAction::Ignored);

            match action {
                KeyAction::Ignored => {}
                KeyAction::Redraw => self.setNeedsDisplay(true),
                KeyAction::Floating(floating) => {
                    if let Some(window) = self.window() {
                        super::apply_window_level(&window, floating);
                    }
                }
            }
        }

        #[unsafe(method(scrollWheel:))]
        fn scroll_wheel(&self, event: &NSEvent) {
            let delta_y = event.deltaY();
            super::with_controller(|controller| controller.scroll_wheel(delta_y));
            self.setNeedsDisplay(true);
        }

        #[unsafe(method(drawRect:))]
        fn draw_rect(&self, _dirty_rect: NSRect) {
            if let Some(snapshot) = super::with_controller(|controller| DrawSnapshot::take(controller)) {
                draw_view(self, &snapshot);
            }
        }
    }
);

// =============================================================================
// CLAVIER
// KEYBOARD
// =============================================================================

/// Effet d'une touche sur la vue
/// Effect of a key press on the view
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyAction {
    Ignored,
    Redraw,
    Floating(bool),
}

fn handle_key(controller: &mut MagnifierController, characters: &str, shift: bool) -> KeyAction {
    match characters {
        "+" | "=" if shift => controller.fast_increase_magnification(),
        "+" | "=" => controller.increase_magnification(),
        "-" | "_" if shift => controller.fast_decrease_magnification(),
        "-" => controller.decrease_magnification(),
        "g" => controller.toggle_grid(),
        "h" => controller.toggle_hot_spot(),
        "x" => controller.toggle_lock_x(),
        "y" => controller.toggle_lock_y(),
        "b" => controller.toggle_lock_both(),
        "f" => controller.toggle_freeze(),
        "m" => controller.toggle_mouse_coordinate(),
        "p" => controller.toggle_coordinate_in_pixel(),
        "v" => controller.toggle_flipped_coordinate(),
        "s" => controller.toggle_separate_screen_coordinate(),
        "c" => controller.toggle_color_value(),
        "k" => controller.cycle_color_model(),
        "i" => controller.cycle_color_profile(),
        "w" => return KeyAction::Floating(controller.toggle_floating_window()),
        _ => return KeyAction::Ignored,
    }
    KeyAction::Redraw
}

// =============================================================================
// INSTANTANÉ DE DESSIN
// DRAW SNAPSHOT
// =============================================================================

/// Ce qu'il faut dessiner, copié hors du contrôleur
/// What to draw, copied out of the controller
struct DrawSnapshot {
    layout: MagnifierLayout,
    image: Option<CGImage>,
    coordinate: Option<String>,
    color: Option<ColorReadout>,
}

impl DrawSnapshot {
    fn take(controller: &MagnifierController) -> Self {
        let surface = controller.surface().borrow();
        let readout = controller.readout().borrow();
        Self {
            layout: surface.layout().clone(),
            image: surface.image().map(|frame| cg_image_from(&frame.bitmap)),
            coordinate: readout.coordinate_text(),
            color: readout.color_readout(),
        }
    }
}

/// Emballe un tampon RGBA dans une CGImage
/// Wraps an RGBA buffer into a CGImage (device RGB, alpha ignored)
fn cg_image_from(bitmap: &RgbaImage) -> CGImage {
    let (width, height) = bitmap.dimensions();
    let provider = CGDataProvider::from_buffer(Arc::new(bitmap.as_raw().clone()));
    CGImage::new(
        width as usize,
        height as usize,
        8,
        32,
        width as usize * 4,
        &CGColorSpace::create_device_rgb(),
        kCGImageAlphaNoneSkipLast,
        &provider,
        false,
        kCGRenderingIntentDefault,
    )
}

// =============================================================================
// DESSIN
// DRAWING
// =============================================================================

fn ns_rect(rect: &Rect) -> NSRect {
    NSRect::new(
        NSPoint::new(rect.origin.x, rect.origin.y),
        NSSize::new(rect.size.width, rect.size.height),
    )
}

/// Dessine la frame complète
/// Draws the whole frame
fn draw_view(view: &NSView, snapshot: &DrawSnapshot) {
    let bounds: NSRect = view.bounds();
    NSColor::blackColor().set();
    NSBezierPath::bezierPathWithRect(bounds).fill();

    let layout = &snapshot.layout;
    if let (Some(image), Some(image_rect)) = (&snapshot.image, layout.image_rect) {
        draw_bitmap(image, &image_rect);
    }

    // -------------------------------------------------------------------------
    // Grille / Grid
    // -------------------------------------------------------------------------
    if !layout.grid.is_empty() {
        let grid_color = NSColor::colorWithCalibratedRed_green_blue_alpha(0.5, 0.5, 0.5, 0.35);
        grid_color.setStroke();
        let path = NSBezierPath::bezierPath();
        for line in &layout.grid {
            path.moveToPoint(NSPoint::new(line.start.x, line.start.y));
            path.lineToPoint(NSPoint::new(line.end.x, line.end.y));
        }
        path.setLineWidth(0.5);
        path.stroke();
    }

    // -------------------------------------------------------------------------
    // Hot spot
    // -------------------------------------------------------------------------
    if let Some(hot_spot) = &layout.hot_spot {
        NSColor::whiteColor().setStroke();
        let border = NSBezierPath::bezierPathWithRect(ns_rect(&hot_spot.border));
        border.setLineWidth(1.0);
        border.stroke();

        NSColor::blackColor().setStroke();
        let marker = NSBezierPath::bezierPathWithRect(ns_rect(&hot_spot.marker));
        marker.setLineWidth(1.0);
        marker.stroke();
    }

    draw_readouts(snapshot);
}

/// Dessine le bitmap sans interpolation
/// Draws the bitmap without interpolation
fn draw_bitmap(cg_image: &CGImage, destination: &Rect) {
    // Opaque CGImage struct, so that `*const OpaqueImage` encodes as `^{CGImage=}`
    #[repr(C)]
    struct OpaqueImage {
        _private: [u8; 0],
    }

    unsafe impl RefEncode for OpaqueImage {
        const ENCODING_REF: Encoding = Encoding::Pointer(&Encoding::Struct("CGImage", &[]));
    }

    let width = cg_image.width() as f64;
    let height = cg_image.height() as f64;

    unsafe {
        // CGImage is a thin wrapper around the CGImageRef
        let cg_image_ref: *const OpaqueImage = {
            let ptr_addr = cg_image as *const CGImage as *const *const OpaqueImage;
            *ptr_addr
        };

        let ns_image_alloc: *mut AnyObject = msg_send![NSImage::class(), alloc];
        let ns_image_ptr: *mut AnyObject =
            msg_send![ns_image_alloc, initWithCGImage: cg_image_ref, size: NSSize::new(width, height)];
        let Some(ns_image) = Retained::from_raw(ns_image_ptr as *mut NSImage) else {
            return;
        };

        NSGraphicsContext::saveGraphicsState_class();
        if let Some(graphics_context) = NSGraphicsContext::currentContext() {
            graphics_context.setImageInterpolation(NSImageInterpolation::None);
        }

        let from_rect = NSRect::new(NSPoint::new(0.0, 0.0), NSSize::new(width, height));
        let _: () = msg_send![
            &*ns_image,
            drawInRect: ns_rect(destination),
            fromRect: from_rect,
            operation: NS_COMPOSITING_OPERATION_SOURCE_OVER,
            fraction: 1.0_f64
        ];

        NSGraphicsContext::restoreGraphicsState_class();
    }
}

// -----------------------------------------------------------------------------
// Valeurs lues / Readouts
// -----------------------------------------------------------------------------

/// Attributs de texte (police + couleur)
/// Text attributes (font + color)
fn text_attributes(font: &NSFont, color: &NSColor) -> Retained<NSDictionary<NSString, AnyObject>> {
    let font_attr_key = NSString::from_str("NSFont");
    let color_attr_key = NSString::from_str("NSColor");
    let keys: &[&NSString] = &[&font_attr_key, &color_attr_key];
    let values: &[&AnyObject] = unsafe {
        &[
            &*(font as *const NSFont as *const AnyObject),
            &*(color as *const NSColor as *const AnyObject),
        ]
    };
    NSDictionary::from_slices(keys, values)
}

/// Dessine une étiquette sur un fond plein
/// Draws one label on a filled box; returns the box height
fn draw_label(text: &str, origin: NSPoint, background: &NSColor, foreground: &NSColor, font: &NSFont) -> f64 {
    let attributes = text_attributes(font, foreground);
    let label = NSString::from_str(text);
    let size: NSSize = unsafe { label.sizeWithAttributes(Some(&attributes)) };

    let box_rect = NSRect::new(
        origin,
        NSSize::new(size.width + READOUT_PADDING * 2.0, size.height + READOUT_PADDING),
    );
    background.setFill();
    NSBezierPath::bezierPathWithRect(box_rect).fill();

    let text_point = NSPoint::new(origin.x + READOUT_PADDING, origin.y + READOUT_PADDING / 2.0);
    unsafe { label.drawAtPoint_withAttributes(text_point, Some(&attributes)) };
    box_rect.size.height
}

/// Empile coordonnées et couleur en bas à gauche
/// Stacks the coordinate and color labels at the bottom left
fn draw_readouts(snapshot: &DrawSnapshot) {
    if snapshot.coordinate.is_none() && snapshot.color.is_none() {
        return;
    }

    let font = NSFont::systemFontOfSize(READOUT_FONT_SIZE);
    let mut y = READOUT_PADDING;

    if let Some(color) = &snapshot.color {
        let [r, g, b, _] = color.rgba.0;
        let swatch = NSColor::colorWithCalibratedRed_green_blue_alpha(
            r as f64 / 255.0,
            g as f64 / 255.0,
            b as f64 / 255.0,
            1.0,
        );
        let text_color = if color.dark_text {
            NSColor::blackColor()
        } else {
            NSColor::whiteColor()
        };
        let text = format!("{}  {}", color.description, color.hex);
        y += draw_label(&text, NSPoint::new(READOUT_PADDING, y), &swatch, &text_color, &font);
        y += READOUT_PADDING / 2.0;
    }

    if let Some(coordinate) = &snapshot.coordinate {
        let background = NSColor::colorWithCalibratedRed_green_blue_alpha(0.0, 0.0, 0.0, 0.6);
        draw_label(
            coordinate,
            NSPoint::new(READOUT_PADDING, y),
            &background,
            &NSColor::whiteColor(),
            &font,
        );
    }
}
