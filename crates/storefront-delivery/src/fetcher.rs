//! Kind-specific load primitives

use crate::{DeliveryError, ImageFormat, Payload, ResourceKind, Result, Transport};
use bytes::Bytes;

/// One load strategy per resource kind, chosen once at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindLoader {
    /// Succeeds only for bytes that carry a known image signature
    Image,
    /// UTF-8 script source
    Script,
    /// UTF-8 stylesheet
    Style,
    /// JSON document
    Data,
}

impl KindLoader {
    pub fn for_kind(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::Image => KindLoader::Image,
            ResourceKind::Script => KindLoader::Script,
            ResourceKind::Style => KindLoader::Style,
            ResourceKind::Data => KindLoader::Data,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            KindLoader::Image => ResourceKind::Image,
            KindLoader::Script => ResourceKind::Script,
            KindLoader::Style => ResourceKind::Style,
            KindLoader::Data => ResourceKind::Data,
        }
    }

    /// Perform a single load attempt
    pub async fn attempt_load(&self, transport: &dyn Transport, url: &str) -> Result<Payload> {
        let body = transport.fetch(url).await?;
        self.decode(body)
    }

    /// Turn a fetched body into a payload of this kind
    pub fn decode(&self, body: Bytes) -> Result<Payload> {
        match self {
            KindLoader::Image => {
                let format = sniff_image(&body).ok_or_else(|| DeliveryError::Decode {
                    kind: ResourceKind::Image,
                    message: "unrecognised image signature".into(),
                })?;
                Ok(Payload::Image {
                    format,
                    bytes: body,
                })
            }
            KindLoader::Script => Ok(Payload::Script(self.text(body)?)),
            KindLoader::Style => Ok(Payload::Style(self.text(body)?)),
            KindLoader::Data => Ok(Payload::Data(serde_json::from_slice(&body)?)),
        }
    }

    fn text(&self, body: Bytes) -> Result<String> {
        String::from_utf8(body.to_vec()).map_err(|e| DeliveryError::Decode {
            kind: self.kind(),
            message: e.to_string(),
        })
    }
}

/// Detect an image container from its leading bytes
pub fn sniff_image(bytes: &[u8]) -> Option<ImageFormat> {
    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

    if bytes.starts_with(PNG) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageFormat::Jpeg)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(ImageFormat::Webp)
    } else {
        let head = &bytes[..bytes.len().min(256)];
        let head = String::from_utf8_lossy(head);
        let head = head.trim_start();
        if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
            Some(ImageFormat::Svg)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_formats() {
        assert_eq!(sniff_image(b"\x89PNG\r\n\x1a\n...."), Some(ImageFormat::Png));
        assert_eq!(sniff_image(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(sniff_image(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(sniff_image(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::Webp));
        assert_eq!(
            sniff_image(b"  <svg xmlns=\"http://www.w3.org/2000/svg\"/>"),
            Some(ImageFormat::Svg)
        );
        assert_eq!(sniff_image(b"<html>not found</html>"), None);
    }

    #[test]
    fn test_image_rejects_html_error_page() {
        let err = KindLoader::Image
            .decode(Bytes::from_static(b"<html>404</html>"))
            .unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Decode {
                kind: ResourceKind::Image,
                ..
            }
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn test_data_parses_json() {
        let payload = KindLoader::Data
            .decode(Bytes::from_static(br#"{"products":[1,2]}"#))
            .unwrap();
        assert_eq!(payload.as_json().unwrap()["products"][1], 2);
    }

    #[test]
    fn test_style_requires_utf8() {
        assert!(KindLoader::Style
            .decode(Bytes::from_static(&[0xC3, 0x28]))
            .is_err());
        assert_eq!(
            KindLoader::Style
                .decode(Bytes::from_static(b"body{margin:0}"))
                .unwrap(),
            Payload::Style("body{margin:0}".into())
        );
    }
}
