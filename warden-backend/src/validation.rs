/// Input validation for every player management route
use std::net::IpAddr;

use thiserror::Error;
use uuid::Uuid;
use warden_store::{PLAYER_NAME_MAX_CHARS, PlayerName, parse_uuid};

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("The {0} field is required")]
    MissingField(&'static str),

    #[error("Player name must be between 3 and 16 characters (got {0})")]
    PlayerNameLength(usize),

    #[error("Player name cannot contain whitespace or control characters")]
    PlayerNameInvalidChars,

    #[error("Player uuid must be a 36 character UUID")]
    InvalidUuid,

    #[error("Reason must be between 3 and 255 characters (got {0})")]
    ReasonLength(usize),

    #[error("Message must be between 1 and 255 characters (got {0})")]
    MessageLength(usize),

    #[error("The {0} field cannot contain control characters")]
    ControlCharacters(&'static str),

    #[error("IP address is invalid")]
    InvalidIp,
}

fn required<'a>(field: &'static str, raw: Option<&'a str>) -> Result<&'a str, ValidationError> {
    raw.ok_or(ValidationError::MissingField(field))
}

/// Validates a Minecraft player name
///
/// Rules:
/// - 3 to 16 characters
/// - No whitespace or control characters (the name ends up in a console command)
///
/// Bridge-namespace prefixes such as `.` or `*` are allowed.
pub fn player_name(raw: Option<&str>) -> Result<PlayerName, ValidationError> {
    let name = required("name", raw)?;
    let len = name.chars().count();
    if !(3..=PLAYER_NAME_MAX_CHARS).contains(&len) {
        return Err(ValidationError::PlayerNameLength(len));
    }
    if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::PlayerNameInvalidChars);
    }

    PlayerName::from(name).map_err(|_| ValidationError::PlayerNameLength(len))
}

/// Validates a player UUID in its dashed, 36 character form
pub fn player_uuid(raw: Option<&str>) -> Result<Uuid, ValidationError> {
    let uuid = required("uuid", raw)?;
    if uuid.len() != 36 {
        return Err(ValidationError::InvalidUuid);
    }
    parse_uuid(uuid).ok_or(ValidationError::InvalidUuid)
}

fn free_text<'a>(
    field: &'static str,
    text: &'a str,
    min: usize,
    too_short_or_long: fn(usize) -> ValidationError,
) -> Result<&'a str, ValidationError> {
    let len = text.chars().count();
    if len < min || len > 255 {
        return Err(too_short_or_long(len));
    }
    if text.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacters(field));
    }
    Ok(text)
}

/// Validates a ban or kick reason (3 to 255 characters)
pub fn reason(raw: Option<&str>) -> Result<&str, ValidationError> {
    free_text("reason", required("reason", raw)?, 3, ValidationError::ReasonLength)
}

/// Like [`reason`], but the field may be left out
pub fn optional_reason(raw: Option<&str>) -> Result<Option<&str>, ValidationError> {
    raw.map(|text| free_text("reason", text, 3, ValidationError::ReasonLength))
        .transpose()
}

/// Validates a whisper message (1 to 255 characters)
pub fn message(raw: Option<&str>) -> Result<&str, ValidationError> {
    free_text("message", required("message", raw)?, 1, ValidationError::MessageLength)
}

/// Validates an IPv4 or IPv6 literal
pub fn ip_address(raw: Option<&str>) -> Result<IpAddr, ValidationError> {
    required("ip", raw)?
        .parse()
        .map_err(|_| ValidationError::InvalidIp)
}

pub fn enabled(raw: Option<bool>) -> Result<bool, ValidationError> {
    raw.ok_or(ValidationError::MissingField("enabled"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Player name validation tests
    #[test]
    fn test_valid_player_names() {
        assert!(player_name(Some("Steve")).is_ok());
        assert!(player_name(Some("jeb_")).is_ok());
        assert!(player_name(Some(".BedrockUser")).is_ok());
        assert!(player_name(Some("abc")).is_ok()); // exactly 3 chars
        assert!(player_name(Some("1234567890123456")).is_ok()); // exactly 16 chars
    }

    #[test]
    fn test_missing_player_name() {
        assert_eq!(player_name(None), Err(ValidationError::MissingField("name")));
    }

    #[test]
    fn test_player_name_length() {
        assert_eq!(
            player_name(Some("ab")),
            Err(ValidationError::PlayerNameLength(2))
        );
        assert_eq!(
            player_name(Some("12345678901234567")),
            Err(ValidationError::PlayerNameLength(17))
        );
    }

    #[test]
    fn test_player_name_invalid_chars() {
        assert_eq!(
            player_name(Some("Notch stop")),
            Err(ValidationError::PlayerNameInvalidChars)
        );
        assert_eq!(
            player_name(Some("Notch\nstop")),
            Err(ValidationError::PlayerNameInvalidChars)
        );
    }

    #[test]
    fn test_player_name_counts_characters_not_bytes() {
        let nine = "ÄÄÄÄÄÄÄÄÄ";
        assert_eq!(player_name(Some(nine)).unwrap().as_str(), nine);

        let sixteen = "ÄÖÜäöüßÉÈÊ名前名前名前";
        assert_eq!(sixteen.chars().count(), 16);
        assert_eq!(player_name(Some(sixteen)).unwrap().as_str(), sixteen);

        let widest = "𝓐".repeat(16);
        assert!(player_name(Some(&widest)).is_ok());
        assert_eq!(
            player_name(Some(&"𝓐".repeat(17))),
            Err(ValidationError::PlayerNameLength(17))
        );
    }

    // UUID validation tests
    #[test]
    fn test_valid_uuid() {
        let uuid = player_uuid(Some("069a79f4-44e9-4726-a5be-fca90e38aaf5")).unwrap();
        assert_eq!(uuid.hyphenated().to_string(), "069a79f4-44e9-4726-a5be-fca90e38aaf5");
    }

    #[test]
    fn test_uuid_must_be_dashed_form() {
        assert_eq!(
            player_uuid(Some("069a79f444e94726a5befca90e38aaf5")),
            Err(ValidationError::InvalidUuid)
        );
        assert_eq!(
            player_uuid(Some("zzzzzzzz-44e9-4726-a5be-fca90e38aaf5")),
            Err(ValidationError::InvalidUuid)
        );
        assert_eq!(player_uuid(None), Err(ValidationError::MissingField("uuid")));
    }

    // Free text validation tests
    #[test]
    fn test_reason_bounds() {
        assert_eq!(reason(Some("bad")), Ok("bad"));
        assert_eq!(reason(Some("no")), Err(ValidationError::ReasonLength(2)));
        let long = "a".repeat(256);
        assert_eq!(reason(Some(&long)), Err(ValidationError::ReasonLength(256)));
        assert_eq!(reason(None), Err(ValidationError::MissingField("reason")));
    }

    #[test]
    fn test_optional_reason() {
        assert_eq!(optional_reason(None), Ok(None));
        assert_eq!(optional_reason(Some("spam")), Ok(Some("spam")));
        assert!(optional_reason(Some("x")).is_err());
    }

    #[test]
    fn test_message_bounds() {
        assert_eq!(message(Some("hi")), Ok("hi"));
        assert_eq!(message(Some("")), Err(ValidationError::MessageLength(0)));
        assert_eq!(
            message(Some("hi\nop me")),
            Err(ValidationError::ControlCharacters("message"))
        );
    }

    // IP validation tests
    #[test]
    fn test_ip_addresses() {
        assert!(ip_address(Some("127.0.0.1")).is_ok());
        assert!(ip_address(Some("::1")).is_ok());
        assert_eq!(ip_address(Some("999.0.0.1")), Err(ValidationError::InvalidIp));
        assert_eq!(ip_address(Some("localhost")), Err(ValidationError::InvalidIp));
    }

    #[test]
    fn test_enabled_required() {
        assert_eq!(enabled(Some(false)), Ok(false));
        assert_eq!(enabled(None), Err(ValidationError::MissingField("enabled")));
    }
}
