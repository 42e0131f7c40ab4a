//! Image-generation request shaping shared across outbounds
//!
//! Quality tiers are provider-defined constants rather than a unified enum:
//! each provider exposes a different knob (`guidance_scale`, `steps`, ...)
//! for the same user-facing concept, so the mapping lives per-provider.

/// `OpenAI`-family guidance scale for the `hd` quality tier
pub const OPENAI_QUALITY_HD_GUIDANCE_SCALE: f64 = 7.5;
/// `OpenAI`-family guidance scale for the `standard` quality tier
pub const OPENAI_QUALITY_STANDARD_GUIDANCE_SCALE: f64 = 2.5;

/// Map a client-facing quality string to an `OpenAI`-family guidance scale
#[must_use]
pub fn openai_guidance_scale(quality: Option<&str>) -> f64 {
    match quality {
        Some("hd") => OPENAI_QUALITY_HD_GUIDANCE_SCALE,
        _ => OPENAI_QUALITY_STANDARD_GUIDANCE_SCALE,
    }
}

/// Encode reference image bytes as a base64 data URL, the shape most
/// `OpenAI`-compatible image endpoints accept for image-to-image input
#[must_use]
pub fn image_bytes_to_data_url(bytes: &[u8], mime_type: &str) -> String {
    use base64::Engine;
    format!("data:{mime_type};base64,{}", base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Sniff an image's MIME type from its leading magic bytes
///
/// Recognizes PNG, JPEG, GIF, and WebP signatures; anything else is
/// reported as `image/png`, the most common provider default.
#[must_use]
pub fn detect_mime_type(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        "image/gif"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/png"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hd_maps_to_higher_guidance_scale() {
        assert!((openai_guidance_scale(Some("hd")) - OPENAI_QUALITY_HD_GUIDANCE_SCALE).abs() < f64::EPSILON);
        assert!((openai_guidance_scale(Some("standard")) - OPENAI_QUALITY_STANDARD_GUIDANCE_SCALE).abs() < f64::EPSILON);
        assert!((openai_guidance_scale(None) - OPENAI_QUALITY_STANDARD_GUIDANCE_SCALE).abs() < f64::EPSILON);
    }

    #[test]
    fn data_url_carries_mime_type() {
        let url = image_bytes_to_data_url(b"hi", "image/png");
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn detects_png_signature() {
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(detect_mime_type(&png), "image/png");
    }

    #[test]
    fn detects_jpeg_signature() {
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0];
        assert_eq!(detect_mime_type(&jpeg), "image/jpeg");
    }

    #[test]
    fn unknown_bytes_default_to_png() {
        assert_eq!(detect_mime_type(b"not an image"), "image/png");
    }
}
