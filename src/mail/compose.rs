//! Builds reminder, digest and test messages.
//!
//! A [`Letter`] is transport-agnostic; `transport` turns it into a MIME
//! message addressed from/to the stored SMTP settings.

use chrono::NaiveDate;
use image::ImageFormat;

use crate::service::calendar::{self, Upcoming};
use crate::types::{Birthday, Gender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// Referenced from HTML as `cid:<content_id>`.
    pub content_id: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Html {
        html: String,
        inline: Vec<InlineImage>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Letter {
    pub subject: String,
    pub body: Body,
}

impl Letter {
    pub fn html(&self) -> Option<&str> {
        match &self.body {
            Body::Html { html, .. } => Some(html),
            Body::Text(_) => None,
        }
    }
}

/// Photo bytes loaded for a reminder, tagged with the stored file name.
#[derive(Debug, Clone)]
pub struct PhotoAttachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

struct Pronouns {
    en: &'static str,
    de: &'static str,
    ar: &'static str,
}

fn pronouns(gender: Option<Gender>) -> Pronouns {
    match gender {
        Some(Gender::Male) => Pronouns {
            en: "he",
            de: "er",
            ar: "هو يبلغ",
        },
        _ => Pronouns {
            en: "she",
            de: "sie",
            ar: "هي تبلغ",
        },
    }
}

/// Four-language reminder for one birthday, with the photo inlined if present.
pub fn reminder(birthday: &Birthday, today: NaiveDate, photo: Option<PhotoAttachment>) -> Letter {
    let name = escape_html(&birthday.name);
    let age = calendar::age_on(birthday.birthdate, today);
    let p = pronouns(birthday.gender);

    let kurdish = format!("Îro rojbûna {name} ye, dibe {age} salî.");
    let english = format!(
        "Today is {name}'s birthday, and {} is turning {age} years old.",
        p.en
    );
    let german = format!(
        "Heute ist der Geburtstag von {name}, und {} wird {age} Jahre alt.",
        p.de
    );
    let arabic = format!("اليوم هو عيد ميلاد {name}، و {} من العمر {age} عامًا.", p.ar);

    let mut inline = Vec::new();
    let mut photo_html = String::new();
    if let Some(photo) = photo {
        let content_id = format!("photo_{}", birthday.id);
        photo_html = format!(
            r#"<p><img src="cid:{content_id}" alt="Photo of {name}" style="max-width: 150px; border-radius: 10px"></p>"#
        );
        inline.push(InlineImage {
            content_id,
            content_type: content_type_for(&photo.file_name).to_string(),
            bytes: photo.bytes,
        });
    }

    let html = format!(
        "<html>\n<body>\n\
         <p><strong>Kurdish (Kurmanci):</strong> {kurdish}</p>\n\
         <p><strong>English:</strong> {english}</p>\n\
         <p><strong>German:</strong> {german}</p>\n\
         <p dir=\"rtl\"><strong>Arabic:</strong> {arabic}</p>\n\
         {photo_html}\n\
         </body>\n</html>\n"
    );

    Letter {
        subject: format!("Birthday Reminder: {}", birthday.name),
        body: Body::Html { html, inline },
    }
}

/// Summary of everything in the upcoming window.
pub fn digest(items: &[Upcoming], days: u32) -> Letter {
    let mut html = String::from("<html>\n<body>\n<h2>Upcoming Birthdays</h2>\n<ul>\n");
    for item in items {
        let when = match item.days_until {
            0 => "Today!".to_string(),
            1 => "in 1 day".to_string(),
            n => format!("in {n} days"),
        };
        html.push_str(&format!(
            "<li><strong>{}</strong> - {} ({when}, turning {})</li>\n",
            escape_html(&item.birthday.name),
            item.target_date.format("%Y-%m-%d"),
            item.turning,
        ));
    }
    html.push_str("</ul>\n</body>\n</html>\n");

    Letter {
        subject: format!("Birthday Digest - Next {days} Days"),
        body: Body::Html {
            html,
            inline: Vec::new(),
        },
    }
}

pub fn test_message() -> Letter {
    Letter {
        subject: "Birthday Manager – SMTP test".to_string(),
        body: Body::Text("SMTP is working. 🎉".to_string()),
    }
}

fn content_type_for(file_name: &str) -> &'static str {
    ImageFormat::from_path(file_name)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream")
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}
