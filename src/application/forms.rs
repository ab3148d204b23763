//! Field-level validation for the site's HTML forms.
//!
//! Validators are pure: they receive the submitted values (plus whatever
//! lookup data they need, such as the list of groups) and either return the
//! cleaned values or a [`FormErrors`] map that the page re-renders next to the
//! offending fields.

use std::{collections::BTreeMap, fmt};

use bytes::Bytes;
use serde::Serialize;

use crate::domain::{entities::GroupRecord, users::validate_username};

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE: &str = "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";
pub const EMPTY_FILE: &str = "The submitted file is empty.";
pub const FILE_AND_CLEAR: &str = "Please either submit a file or check the clear checkbox, not both.";
pub const PASSWORD_TOO_SHORT: &str =
    "This password is too short. It must contain at least 8 characters.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn’t match.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const BAD_CREDENTIALS: &str = "Please enter a correct username and password. Note that both fields may be case-sensitive.";

pub const MIN_PASSWORD_CHARS: usize = 8;

/// Key under which errors that belong to no single field are stored.
pub const NON_FIELD: &str = "__all__";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn non_field(&self) -> &[String] {
        self.field(NON_FIELD)
    }

    fn finish<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FormErrors {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Raw values of the post create/edit form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFormInput {
    pub text: String,
    /// Selected group id as submitted; empty means "no group".
    pub group: String,
    pub image: Option<ImageUpload>,
    /// Set by the edit form's clear checkbox.
    pub clear_image: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageChange {
    Keep,
    Clear,
    Replace(ImageUpload),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidPost {
    pub text: String,
    pub group_id: Option<i64>,
    pub image: ImageChange,
}

pub fn validate_post(input: &PostFormInput, groups: &[GroupRecord]) -> Result<ValidPost, FormErrors> {
    let mut errors = FormErrors::default();

    let text = input.text.trim();
    if text.is_empty() {
        errors.add("text", REQUIRED);
    }

    let group_id = match input.group.trim() {
        "" => None,
        raw => match raw.parse::<i64>() {
            Ok(id) if groups.iter().any(|group| group.id == id) => Some(id),
            _ => {
                errors.add("group", INVALID_CHOICE);
                None
            }
        },
    };

    let image = match (&input.image, input.clear_image) {
        (Some(_), true) => {
            errors.add("image", FILE_AND_CLEAR);
            ImageChange::Keep
        }
        (Some(upload), false) => match check_image(upload) {
            Ok(()) => ImageChange::Replace(upload.clone()),
            Err(message) => {
                errors.add("image", message);
                ImageChange::Keep
            }
        },
        (None, true) => ImageChange::Clear,
        (None, false) => ImageChange::Keep,
    };

    errors.finish(ValidPost {
        text: text.to_string(),
        group_id,
        image,
    })
}

fn check_image(upload: &ImageUpload) -> Result<(), &'static str> {
    if upload.bytes.is_empty() {
        return Err(EMPTY_FILE);
    }
    match imagesize::blob_size(&upload.bytes) {
        Ok(size) if size.width > 0 && size.height > 0 => Ok(()),
        _ => Err(INVALID_IMAGE),
    }
}

pub fn validate_comment(text: &str) -> Result<String, FormErrors> {
    let text = text.trim();
    if text.is_empty() {
        return Err(FormErrors::single("text", REQUIRED));
    }
    Ok(text.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupInput {
    pub username: String,
    pub password1: String,
    pub password2: String,
}

/// Checks the signup fields; username uniqueness is left to the caller.
pub fn validate_signup(input: &SignupInput) -> Result<String, FormErrors> {
    let mut errors = FormErrors::default();

    let username = input.username.trim();
    if let Err(err) = validate_username(username) {
        errors.add("username", err.to_string());
    }

    if input.password1.is_empty() {
        errors.add("password1", REQUIRED);
    } else if input.password1.chars().count() < MIN_PASSWORD_CHARS {
        errors.add("password1", PASSWORD_TOO_SHORT);
    }

    if input.password2.is_empty() {
        errors.add("password2", REQUIRED);
    } else if !input.password1.is_empty() && input.password1 != input.password2 {
        errors.add("password2", PASSWORD_MISMATCH);
    }

    errors.finish(username.to_string())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

pub fn validate_login(input: &LoginInput) -> Result<(), FormErrors> {
    let mut errors = FormErrors::default();
    if input.username.trim().is_empty() {
        errors.add("username", REQUIRED);
    }
    if input.password.is_empty() {
        errors.add("password", REQUIRED);
    }
    errors.finish(())
}
