//! Form inputs and the checks run on them before anything is sent.
//!
//! Limits mirror what the server enforces so users see field errors without
//! a round trip. The server stays the authority; these only catch the obvious.

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::api::transport::FormPart;
use crate::api::FieldErrors;

// ============================================================================
// Constants
// ============================================================================

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 80;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_EMAIL_LENGTH: usize = 120;
const MAX_NAME_LENGTH: usize = 120;

const MAX_DESCRIPTION_LENGTH: usize = 255;
const MAX_PARISH_LENGTH: usize = 100;
const MAX_SEX_LENGTH: usize = 20;
const MAX_RACE_LENGTH: usize = 100;
const MAX_CUISINE_LENGTH: usize = 100;
const MAX_COLOUR_LENGTH: usize = 50;
const MAX_SUBJECT_LENGTH: usize = 100;

/// Earliest accepted birth year.
const MIN_BIRTH_YEAR: i32 = 1900;
/// Profiles are for adults only.
const MIN_AGE_YEARS: i32 = 18;
/// Height upper bound (exclusive of anything above).
const MAX_HEIGHT: f64 = 300.0;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn check_required(errors: &mut FieldErrors, field: &str, value: &str, label: &str, max: usize) {
    if value.trim().is_empty() {
        errors.add(field, format!("{} is required", label));
    } else if char_len(value) > max {
        errors.add(field, format!("{} must be at most {} characters", label, max));
    }
}

/// Loose shape check; the server does the real validation.
fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// A profile photo attached to registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl PhotoUpload {
    /// Build from a file name, guessing the content type from the extension.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime = file_name
            .rsplit_once('.')
            .and_then(|(_, ext)| match ext.to_ascii_lowercase().as_str() {
                "jpg" | "jpeg" => Some("image/jpeg"),
                "png" => Some("image/png"),
                "gif" => Some("image/gif"),
                "webp" => Some("image/webp"),
                _ => None,
            })
            .map(str::to_string);
        Self {
            file_name,
            mime,
            bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterForm {
    pub username: String,
    pub password: String,
    pub email: String,
    pub name: String,
    pub photo: Option<PhotoUpload>,
}

impl RegisterForm {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();

        let username_len = char_len(&self.username);
        if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&username_len) {
            errors.add(
                "username",
                format!(
                    "Username must be between {} and {} characters",
                    MIN_USERNAME_LENGTH, MAX_USERNAME_LENGTH
                ),
            );
        }
        if char_len(&self.password) < MIN_PASSWORD_LENGTH {
            errors.add(
                "password",
                format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
            );
        }
        if !looks_like_email(&self.email) {
            errors.add("email", "Please enter a valid email");
        } else if char_len(&self.email) > MAX_EMAIL_LENGTH {
            errors.add(
                "email",
                format!("Email must be at most {} characters", MAX_EMAIL_LENGTH),
            );
        }
        check_required(&mut errors, "name", &self.name, "Name", MAX_NAME_LENGTH);

        errors
    }

    /// Multipart body: every text field, plus the photo when attached.
    pub fn to_parts(&self) -> Vec<FormPart> {
        let mut parts: Vec<FormPart> = [
            ("username", &self.username),
            ("password", &self.password),
            ("email", &self.email),
            ("name", &self.name),
        ]
        .into_iter()
        .map(|(name, value)| FormPart::Text {
            name: name.to_string(),
            value: value.clone(),
        })
        .collect();

        if let Some(ref photo) = self.photo {
            parts.push(FormPart::File {
                name: "photo".to_string(),
                file_name: photo.file_name.clone(),
                mime: photo.mime.clone(),
                bytes: photo.bytes.clone(),
            });
        }
        parts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if self.username.is_empty() {
            errors.add("username", "Username is required");
        }
        if self.password.is_empty() {
            errors.add("password", "Password is required");
        }
        errors
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct NewProfileForm {
    pub description: String,
    pub parish: String,
    pub biography: String,
    pub sex: String,
    pub race: String,
    pub birth_year: i32,
    pub height: f64,
    pub fav_cuisine: String,
    pub fav_colour: String,
    pub fav_school_subject: String,
    #[serde(default)]
    pub political: bool,
    #[serde(default)]
    pub religious: bool,
    #[serde(default)]
    pub family_oriented: bool,
}

impl NewProfileForm {
    pub fn validate(&self) -> FieldErrors {
        self.validate_in(Utc::now().year())
    }

    fn validate_in(&self, current_year: i32) -> FieldErrors {
        let mut errors = FieldErrors::new();

        check_required(
            &mut errors,
            "description",
            &self.description,
            "Description",
            MAX_DESCRIPTION_LENGTH,
        );
        check_required(&mut errors, "parish", &self.parish, "Parish", MAX_PARISH_LENGTH);
        if self.biography.trim().is_empty() {
            errors.add("biography", "Biography is required");
        }
        check_required(&mut errors, "sex", &self.sex, "Sex", MAX_SEX_LENGTH);
        check_required(&mut errors, "race", &self.race, "Race", MAX_RACE_LENGTH);
        check_required(
            &mut errors,
            "fav_cuisine",
            &self.fav_cuisine,
            "Favorite cuisine",
            MAX_CUISINE_LENGTH,
        );
        check_required(
            &mut errors,
            "fav_colour",
            &self.fav_colour,
            "Favorite colour",
            MAX_COLOUR_LENGTH,
        );
        check_required(
            &mut errors,
            "fav_school_subject",
            &self.fav_school_subject,
            "Favorite school subject",
            MAX_SUBJECT_LENGTH,
        );

        let latest_birth_year = current_year - MIN_AGE_YEARS;
        if self.birth_year < MIN_BIRTH_YEAR {
            errors.add(
                "birth_year",
                format!(
                    "Birth year must be between {} and {}",
                    MIN_BIRTH_YEAR, latest_birth_year
                ),
            );
        } else if self.birth_year > latest_birth_year {
            errors.add("birth_year", "You must be at least 18 years old");
        }

        if self.height.is_nan() || self.height <= 0.0 {
            errors.add("height", "Height must be a positive number");
        } else if self.height > MAX_HEIGHT {
            errors.add("height", format!("Height must be at most {}", MAX_HEIGHT));
        }

        errors
    }
}
