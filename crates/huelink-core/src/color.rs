//! Color engine.
//!
//! Pure conversions between 8-bit RGB, CIE 1931 xy chromaticity (the
//! bridge's native color form), and mired color temperature. Every function
//! is total: inputs that would produce NaN or infinity yield zeros instead.

#![allow(clippy::many_single_char_names, clippy::similar_names)]

use huelink_api::LightUpdate;

/// Added to a mired value before converting to Kelvin. Bridges report
/// noticeably warm temperatures; the shift cools the rendered preview.
pub const MIRED_ADJUSTMENT: f64 = -30.0;

/// Hue rotation, in degrees, applied to the temperature preview color.
pub const MIRED_HUE_OFFSET: f64 = -4.0;

/// Color temperature range the bridge accepts.
pub const MIRED_MIN: u16 = 153;
pub const MIRED_MAX: u16 = 500;

// Wide RGB D65 primaries.
const RGB_TO_XYZ: [[f64; 3]; 3] = [
    [0.664_511, 0.154_324, 0.162_028],
    [0.283_881, 0.668_433, 0.047_685],
    [0.000_088, 0.072_310, 0.986_039],
];

const XYZ_TO_RGB: [[f64; 3]; 3] = [
    [1.656_492, -0.354_851, -0.255_038],
    [-0.707_196, 1.655_397, 0.036_152],
    [0.051_713, -0.121_364, 1.011_530],
];

/// An 8-bit sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A chromaticity coordinate plus a brightness percentage (0-100), the
/// perceptual luma of the source color.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Chromaticity {
    pub x: f64,
    pub y: f64,
    pub brightness: f64,
}

// ── RGB → xy ─────────────────────────────────────────────────────────

pub fn rgb_to_xy(rgb: Rgb) -> Chromaticity {
    let [r, g, b] = [rgb.r, rgb.g, rgb.b].map(|c| gamma_expand(f64::from(c) / 255.0));

    let [x_, y_, z_] = mul(&RGB_TO_XYZ, [r, g, b]);
    let sum = x_ + y_ + z_;
    let (x, y) = if sum > 0.0 { (x_ / sum, y_ / sum) } else { (0.0, 0.0) };

    let (rf, gf, bf) = (f64::from(rgb.r), f64::from(rgb.g), f64::from(rgb.b));
    let luma = (0.299 * rf * rf + 0.587 * gf * gf + 0.114 * bf * bf).sqrt();

    Chromaticity {
        x: finite_or_zero(x),
        y: finite_or_zero(y),
        brightness: finite_or_zero(luma * (100.0 / 255.0)),
    }
}

// ── xy → RGB ─────────────────────────────────────────────────────────

/// Convert a chromaticity back to RGB at full luminance, then darken by
/// `brightness` percent.
pub fn xy_to_rgb(x: f64, y: f64, brightness: f64) -> Rgb {
    if !(x.is_finite() && y.is_finite()) || y <= 0.0 {
        return Rgb::default();
    }

    let big_y = 1.0;
    let big_x = (big_y / y) * x;
    let big_z = (big_y / y) * (1.0 - x - y);
    let mut linear = mul(&XYZ_TO_RGB, [big_x, big_y, big_z]);

    // Out of gamut: scale the whole triple down so the hue survives.
    scale_to_unit(&mut linear);
    let mut encoded = linear.map(|v| gamma_compress(v).max(0.0));
    scale_to_unit(&mut encoded);

    let level = finite_or_zero(brightness).clamp(0.0, 100.0) / 100.0;
    let [r, g, b] = encoded.map(|v| to_channel(v * 255.0 * level));
    Rgb { r, g, b }
}

// ── Mired → RGB ──────────────────────────────────────────────────────

/// Approximate the color a white light shows at `mired`, for previews.
pub fn mired_to_rgb(mired: f64, brightness: f64) -> Rgb {
    let mired = if mired.is_finite() {
        mired.clamp(f64::from(MIRED_MIN), f64::from(MIRED_MAX))
    } else {
        f64::from(MIRED_MIN)
    };
    let kelvin = 1_000_000.0 / (mired + MIRED_ADJUSTMENT);
    let [r, g, b] = kelvin_to_rgb(kelvin);

    let (h, s, v) = rgb_to_hsv(r, g, b);
    let [r, g, b] = hsv_to_rgb((h + MIRED_HUE_OFFSET).rem_euclid(360.0), s, v);

    let level = finite_or_zero(brightness).clamp(0.0, 100.0) / 100.0;
    Rgb {
        r: to_channel(r * level),
        g: to_channel(g * level),
        b: to_channel(b * level),
    }
}

/// Blackbody approximation on the 0-255 scale.
fn kelvin_to_rgb(kelvin: f64) -> [f64; 3] {
    let t = kelvin / 100.0;

    let r = if t <= 66.0 {
        255.0
    } else {
        329.698_727_446 * (t - 60.0).powf(-0.133_204_759_2)
    };
    let g = if t <= 66.0 {
        99.470_802_586_1 * t.ln() - 161.119_568_166_1
    } else {
        288.122_169_528_3 * (t - 60.0).powf(-0.075_514_849_2)
    };
    let b = if t >= 66.0 {
        255.0
    } else if t <= 19.0 {
        0.0
    } else {
        138.517_731_223_1 * (t - 10.0).ln() - 305.044_792_730_7
    };

    [r, g, b].map(|c| finite_or_zero(c).clamp(0.0, 255.0))
}

// ── Helpers for callers ──────────────────────────────────────────────

/// Parse `#rrggbb` or `rrggbb`.
pub fn hex_to_rgb(hex: &str) -> Option<Rgb> {
    let hex = hex.strip_prefix('#').unwrap_or(hex);
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb {
        r: channel(0)?,
        g: channel(2)?,
        b: channel(4)?,
    })
}

pub fn rgb_to_hex(rgb: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb.r, rgb.g, rgb.b)
}

/// Kelvin to mired, clamped to the range the bridge accepts.
pub fn kelvin_to_mired(kelvin: u32) -> u16 {
    if kelvin == 0 {
        return MIRED_MAX;
    }
    let mired = (1_000_000 + kelvin / 2) / kelvin;
    u16::try_from(mired).unwrap_or(MIRED_MAX).clamp(MIRED_MIN, MIRED_MAX)
}

pub fn mired_to_kelvin(mired: u16) -> u32 {
    if mired == 0 {
        return 0;
    }
    let mired = u32::from(mired);
    (1_000_000 + mired / 2) / mired
}

/// State change that shows `rgb` on a light: chromaticity plus its luma as
/// the dimming level.
pub fn rgb_update(rgb: Rgb) -> LightUpdate {
    let c = rgb_to_xy(rgb);
    if c.brightness <= 0.0 {
        return LightUpdate::default().on(false);
    }
    LightUpdate::default()
        .on(true)
        .xy(round4(c.x), round4(c.y))
        .brightness(c.brightness)
}

/// State change that sets a white color temperature in Kelvin.
pub fn temperature_update(kelvin: u32) -> LightUpdate {
    LightUpdate::default().on(true).mirek(kelvin_to_mired(kelvin))
}

// ── Internals ────────────────────────────────────────────────────────

fn gamma_expand(v: f64) -> f64 {
    if v > 0.040_45 {
        ((v + 0.055) / 1.055).powf(2.4)
    } else {
        v / 12.92
    }
}

fn gamma_compress(v: f64) -> f64 {
    if v <= 0.003_130_8 {
        12.92 * v
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

fn mul(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    m.map(|row| row[0] * v[0] + row[1] * v[1] + row[2] * v[2])
}

fn scale_to_unit(v: &mut [f64; 3]) {
    let max = v.iter().copied().fold(f64::MIN, f64::max);
    if max > 1.0 {
        for c in v.iter_mut() {
            *c /= max;
        }
    }
}

fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let h = if delta <= 0.0 {
        0.0
    } else if (max - r).abs() < f64::EPSILON {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if (max - g).abs() < f64::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let s = if max <= 0.0 { 0.0 } else { delta / max };
    (h, s, max)
}

fn hsv_to_rgb(h: f64, s: f64, v: f64) -> [f64; 3] {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0).rem_euclid(2.0) - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match h {
        h if h < 60.0 => (c, x, 0.0),
        h if h < 120.0 => (x, c, 0.0),
        h if h < 180.0 => (0.0, c, x),
        h if h < 240.0 => (0.0, x, c),
        h if h < 300.0 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    [r + m, g + m, b + m]
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::as_conversions)]
fn to_channel(v: f64) -> u8 {
    // Clamped to 0..=255 first, so the cast is exact.
    finite_or_zero(v).round().clamp(0.0, 255.0) as u8
}

// ── Tests ────────────────────────────────────────────────────────────
