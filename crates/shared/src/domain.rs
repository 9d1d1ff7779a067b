use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const DEFAULT_AVATAR: &str = "/default-avatar.png";
pub const FALLBACK_DISPLAY_NAME: &str = "User";

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }
    };
}

id_newtype!(TaskId);
id_newtype!(CommentId);
id_newtype!(StudentId);
id_newtype!(RequestId);
id_newtype!(EmailId);

/// Deserializes `null` the same way as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    Processing,
    Failed,
    Blocked,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Todo,
        TaskStatus::Processing,
        TaskStatus::Failed,
        TaskStatus::Blocked,
        TaskStatus::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Blocked => "BLOCKED",
            TaskStatus::Done => "DONE",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown task status '{0}', expected one of TODO, PROCESSING, FAILED, BLOCKED, DONE")]
pub struct UnknownTaskStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownTaskStatus;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim();
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownTaskStatus(raw.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Student,
    Admin,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommentAuthor {
    #[serde(rename = "givenName", alias = "name", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<UserRole>,
    #[serde(rename = "profileImage", alias = "avatar", default)]
    pub avatar_url: Option<String>,
}

impl CommentAuthor {
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(FALLBACK_DISPLAY_NAME)
    }

    pub fn role(&self) -> UserRole {
        self.role.unwrap_or_default()
    }

    pub fn avatar_url(&self) -> &str {
        self.avatar_url
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(DEFAULT_AVATAR)
    }
}

/// The backend sends either a populated author object or a bare reference id.
fn populated_author<'de, D>(deserializer: D) -> Result<Option<CommentAuthor>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AuthorField {
        Populated(CommentAuthor),
        Reference(String),
    }

    Ok(match Option::<AuthorField>::deserialize(deserializer)? {
        Some(AuthorField::Populated(author)) => Some(author),
        Some(AuthorField::Reference(_)) | None => None,
    })
}

/// A reply under a top-level comment. Replies never nest further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(rename = "_id")]
    pub id: CommentId,
    #[serde(default, deserialize_with = "populated_author")]
    pub user: Option<CommentAuthor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(rename = "_id")]
    pub id: CommentId,
    #[serde(default, deserialize_with = "populated_author")]
    pub user: Option<CommentAuthor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub replies: Vec<Reply>,
}

impl Comment {
    pub fn author(&self) -> CommentAuthor {
        self.user.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: TaskId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: TaskStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub assigned_user: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentKind {
    Passport,
    PassportPhoto,
    StemCertificate,
    UsscCertificate,
    OfferLetter,
    Bill,
    Nid,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 7] = [
        DocumentKind::Passport,
        DocumentKind::PassportPhoto,
        DocumentKind::StemCertificate,
        DocumentKind::UsscCertificate,
        DocumentKind::OfferLetter,
        DocumentKind::Bill,
        DocumentKind::Nid,
    ];

    /// Profile field the uploaded url is stored under.
    pub fn field_name(self) -> &'static str {
        match self {
            DocumentKind::Passport => "passport",
            DocumentKind::PassportPhoto => "passportPhoto",
            DocumentKind::StemCertificate => "stemCertificate",
            DocumentKind::UsscCertificate => "usscCertificate",
            DocumentKind::OfferLetter => "offerLetters",
            DocumentKind::Bill => "bills",
            DocumentKind::Nid => "nid",
        }
    }

    pub fn allows_multiple(self) -> bool {
        matches!(self, DocumentKind::OfferLetter | DocumentKind::Bill)
    }

    pub fn download_stem(self) -> &'static str {
        match self {
            DocumentKind::Passport => "passport",
            DocumentKind::PassportPhoto => "passport_photo",
            DocumentKind::StemCertificate => "stem_certificate",
            DocumentKind::UsscCertificate => "ussc_certificate",
            DocumentKind::OfferLetter => "offer_letter",
            DocumentKind::Bill => "bill",
            DocumentKind::Nid => "nid",
        }
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let wanted = raw.trim().replace(['-', '_'], "").to_ascii_lowercase();
        DocumentKind::ALL
            .into_iter()
            .find(|kind| {
                kind.field_name().to_ascii_lowercase() == wanted
                    || kind.download_stem().replace('_', "") == wanted
            })
            .ok_or_else(|| format!("unknown document kind '{raw}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn urls(&self) -> Vec<&str> {
        match self {
            OneOrMany::One(url) if url.is_empty() => Vec::new(),
            OneOrMany::One(url) => vec![url.as_str()],
            OneOrMany::Many(urls) => urls.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<StudentId>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub contact_numbers: Vec<String>,
    #[serde(default)]
    pub university_name: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
    #[serde(default)]
    pub passport: Option<String>,
    #[serde(default)]
    pub passport_photo: Option<String>,
    #[serde(default)]
    pub stem_certificate: Option<String>,
    #[serde(default)]
    pub ussc_certificate: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub offer_letters: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bills: Vec<String>,
    #[serde(default)]
    pub nid: Option<OneOrMany>,
}

impl StudentProfile {
    pub fn full_name(&self) -> String {
        let joined = [self.given_name.as_deref(), self.surname.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if joined.is_empty() {
            self.name.clone().unwrap_or_default()
        } else {
            joined
        }
    }

    /// Every stored document url with the file name offered for download.
    pub fn documents(&self) -> Vec<(DocumentKind, String, String)> {
        let mut out = Vec::new();
        let mut push_one = |kind: DocumentKind, url: Option<&str>| {
            if let Some(url) = url.filter(|url| !url.is_empty()) {
                out.push((kind, url.to_string(), format!("{}.pdf", kind.download_stem())));
            }
        };
        push_one(DocumentKind::Passport, self.passport.as_deref());
        push_one(DocumentKind::PassportPhoto, self.passport_photo.as_deref());
        push_one(DocumentKind::StemCertificate, self.stem_certificate.as_deref());
        push_one(DocumentKind::UsscCertificate, self.ussc_certificate.as_deref());

        let many: [(DocumentKind, Vec<&str>); 3] = [
            (
                DocumentKind::OfferLetter,
                self.offer_letters.iter().map(String::as_str).collect(),
            ),
            (
                DocumentKind::Nid,
                self.nid.as_ref().map(OneOrMany::urls).unwrap_or_default(),
            ),
            (DocumentKind::Bill, self.bills.iter().map(String::as_str).collect()),
        ];
        for (kind, urls) in many {
            let numbered = urls.len() > 1 || kind.allows_multiple();
            for (index, url) in urls.into_iter().enumerate() {
                let name = if numbered {
                    format!("{}_{}.pdf", kind.download_stem(), index + 1)
                } else {
                    format!("{}.pdf", kind.download_stem())
                };
                out.push((kind, url.to_string(), name));
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestComment {
    #[serde(default, deserialize_with = "populated_author")]
    pub user: Option<CommentAuthor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A support ticket raised by a student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportRequest {
    #[serde(rename = "_id")]
    pub id: RequestId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub comments: Vec<RequestComment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    #[serde(rename = "_id")]
    pub id: EmailId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<StudentId>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub attachments: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively_and_rejects_unknown() {
        assert_eq!("done".parse::<TaskStatus>(), Ok(TaskStatus::Done));
        assert_eq!(" PROCESSING ".parse::<TaskStatus>(), Ok(TaskStatus::Processing));
        assert!("ARCHIVED".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn task_decodes_backend_shape_with_nulls() {
        let raw = serde_json::json!({
            "_id": "t1",
            "title": "Visa documents",
            "status": null,
            "assignedUser": null,
            "comments": [{
                "_id": "c1",
                "user": "65f0c0ffee",
                "text": "hello",
                "createdAt": "2024-05-01T10:00:00.000Z",
                "replies": [{
                    "_id": "r1",
                    "user": {"givenName": "Admin", "role": "admin"},
                    "text": "noted",
                    "createdAt": "2024-05-01T11:00:00Z"
                }]
            }]
        });
        let task: Task = serde_json::from_value(raw).expect("decode task");
        assert_eq!(task.status, TaskStatus::Todo);
        assert_eq!(task.assigned_user, "");
        assert_eq!(task.comments[0].author().display_name(), FALLBACK_DISPLAY_NAME);
        assert_eq!(task.comments[0].author().avatar_url(), DEFAULT_AVATAR);
        let reply_author = task.comments[0].replies[0].user.clone().expect("author");
        assert_eq!(reply_author.role(), UserRole::Admin);
        assert_eq!(reply_author.display_name(), "Admin");
    }

    #[test]
    fn profile_lists_documents_with_download_names() {
        let profile: StudentProfile = serde_json::from_value(serde_json::json!({
            "givenName": "Ada",
            "surname": "Lovelace",
            "passport": "https://files/p.pdf",
            "offerLetters": ["https://files/o1", "https://files/o2"],
            "nid": "https://files/nid.png"
        }))
        .expect("decode profile");

        assert_eq!(profile.full_name(), "Ada Lovelace");
        let names: Vec<String> = profile
            .documents()
            .into_iter()
            .map(|(_, _, name)| name)
            .collect();
        assert_eq!(
            names,
            vec!["passport.pdf", "offer_letter_1.pdf", "offer_letter_2.pdf", "nid.pdf"]
        );
    }

    #[test]
    fn document_kind_parses_field_and_stem_names() {
        assert_eq!("passportPhoto".parse(), Ok(DocumentKind::PassportPhoto));
        assert_eq!("stem-certificate".parse(), Ok(DocumentKind::StemCertificate));
        assert_eq!("offerLetters".parse(), Ok(DocumentKind::OfferLetter));
        assert!("diploma".parse::<DocumentKind>().is_err());
    }
}
