use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("QR encoding failed: {0}")]
    Encode(String),
}

/// Render `data` as an SVG QR code suitable for printing on a card.
pub fn render_qr_svg(data: &str) -> Result<String, QrError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .map_err(|e| QrError::Encode(e.to_string()))?;
    Ok(code
        .render::<svg::Color<'_>>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_svg_document() {
        let svg = render_qr_svg("https://access.example.cy/qr/HTL-000001?token=abc").unwrap();
        assert!(svg.contains("<svg"));
    }
}
