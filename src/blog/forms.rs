use std::collections::BTreeMap;

use rusqlite::Connection;
use serde::Deserialize;

use crate::blog::posts;
use crate::blog::users::{self, NewUser};
use crate::media::{self, ImageUpload, ValidImage};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has(&self, field: &str) -> bool {
        !self.get(field).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

// --- Post ---

/// Raw post form fields as submitted.
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    pub text: String,
    pub group: String,
    pub image: Option<ImageUpload>,
}

#[derive(Debug)]
pub struct ValidPost {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: Option<ValidImage>,
}

impl PostForm {
    pub fn validate(self, conn: &Connection) -> rusqlite::Result<Result<ValidPost, FormErrors>> {
        let mut errors = FormErrors::default();

        let text = self.text.trim().to_string();
        if text.is_empty() {
            errors.add("text", REQUIRED);
        }

        let group = self.group.trim();
        let group_id = if group.is_empty() {
            None
        } else {
            match group.parse::<i64>() {
                Ok(id) if posts::find_group(conn, id)?.is_some() => Some(id),
                _ => {
                    errors.add("group", INVALID_CHOICE);
                    None
                }
            }
        };

        let image = match self.image {
            Some(upload) if !upload.data.is_empty() => match media::inspect_image(upload) {
                Ok(image) => Some(image),
                Err(e) => {
                    tracing::debug!("Rejected image upload: {}", e);
                    errors.add("image", INVALID_IMAGE);
                    None
                }
            },
            _ => None,
        };

        Ok(errors.into_result(ValidPost {
            text,
            group_id,
            image,
        }))
    }
}

// --- Comment ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

impl CommentForm {
    pub fn validate(&self) -> Result<String, FormErrors> {
        let mut errors = FormErrors::default();
        let text = self.text.trim().to_string();
        if text.is_empty() {
            errors.add("text", REQUIRED);
        }
        errors.into_result(text)
    }
}

// --- Signup ---

pub const MAX_USERNAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.chars().count() <= MAX_USERNAME_LEN
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
}

impl SignupForm {
    pub fn validate(&self, conn: &Connection) -> rusqlite::Result<Result<NewUser, FormErrors>> {
        let mut errors = FormErrors::default();
        let username = self.username.trim();

        if username.is_empty() {
            errors.add("username", REQUIRED);
        } else if !is_valid_username(username) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        } else if users::username_taken(conn, username)? {
            errors.add("username", USERNAME_TAKEN);
        }

        let email = self.email.trim();
        if !email.is_empty() && !email.contains('@') {
            errors.add("email", "Enter a valid email address.");
        }

        if self.password1.is_empty() {
            errors.add("password1", REQUIRED);
        } else if self.password1.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password1",
                format!(
                    "This password is too short. It must contain at least {} characters.",
                    MIN_PASSWORD_LEN
                ),
            );
        }
        if self.password1 != self.password2 {
            errors.add("password2", "The two password fields didn't match.");
        }

        Ok(errors.into_result(NewUser {
            username: username.to_string(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: email.to_string(),
            password: self.password1.clone(),
        }))
    }
}
