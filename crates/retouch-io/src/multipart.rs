//! `multipart/form-data` body encoding for uploads.

use std::fmt::Write as _;

/// One part of a form.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        content_type: String,
        data: Vec<u8>,
    },
}

/// Builder for a `multipart/form-data` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    parts: Vec<Part>,
}

/// An encoded form: the body bytes and the matching `Content-Type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedForm {
    /// `multipart/form-data; boundary=...`
    pub content_type: String,
    /// Encoded body.
    pub body: Vec<u8>,
}

impl MultipartForm {
    /// Create an empty form.
    #[must_use]
    pub const fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Add a text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Add a file field. The content type is derived from the file
    /// name's extension.
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, file_name: impl Into<String>, data: Vec<u8>) -> Self {
        let file_name = file_name.into();
        self.parts.push(Part::File {
            name: name.into(),
            content_type: content_type_for(&file_name).to_owned(),
            file_name,
            data,
        });
        self
    }

    /// Encode the form, picking a boundary that occurs in no part.
    #[must_use]
    pub fn finish(self) -> EncodedForm {
        let boundary = self.boundary();
        let mut body = Vec::new();
        for part in &self.parts {
            let mut head = format!("--{boundary}\r\n");
            match part {
                Part::Text { name, value } => {
                    let _ = write!(
                        head,
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        escape(name)
                    );
                    body.extend_from_slice(head.as_bytes());
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File {
                    name,
                    file_name,
                    content_type,
                    data,
                } => {
                    let _ = write!(
                        head,
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n",
                        escape(name),
                        escape(file_name),
                    );
                    body.extend_from_slice(head.as_bytes());
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        EncodedForm {
            content_type: format!("multipart/form-data; boundary={boundary}"),
            body,
        }
    }

    fn boundary(&self) -> String {
        let mut n: u32 = 0;
        loop {
            let candidate = format!("----retouch-boundary-{n:08x}");
            let needle = candidate.as_bytes();
            let clashes = self.parts.iter().any(|part| {
                let haystack = match part {
                    Part::Text { value, .. } => value.as_bytes(),
                    Part::File { data, .. } => data.as_slice(),
                };
                haystack.windows(needle.len()).any(|w| w == needle)
            });
            if !clashes {
                return candidate;
            }
            n = n.wrapping_add(1);
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// MIME type for an image file name, by extension.
#[must_use]
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_text_and_file_parts() {
        let form = MultipartForm::new()
            .file("file", "mask.png", b"PNGDATA".to_vec())
            .text("type", "mask")
            .finish();

        let boundary = form
            .content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap_or_default()
            .to_owned();
        assert!(!boundary.is_empty());

        let body = String::from_utf8(form.body).unwrap_or_default();
        let expected = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"mask.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             PNGDATA\r\n\
             --{boundary}\r\n\
             Content-Disposition: form-data; name=\"type\"\r\n\r\n\
             mask\r\n\
             --{boundary}--\r\n"
        );
        assert_eq!(body, expected);
    }

    #[test]
    fn boundary_avoids_part_content() {
        let first = MultipartForm::new().finish().content_type;
        let taken = first
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap_or_default()
            .to_owned();
        let form = MultipartForm::new()
            .file("file", "a.jpg", taken.clone().into_bytes())
            .finish();
        assert!(!form.content_type.ends_with(&taken));
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("a.PNG"), "image/png");
        assert_eq!(content_type_for("b.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("c.webp"), "image/webp");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[test]
    fn quotes_in_names_are_escaped() {
        let form = MultipartForm::new().text("a\"b", "v").finish();
        let body = String::from_utf8_lossy(&form.body);
        assert!(body.contains("name=\"a\\\"b\""));
    }
}
