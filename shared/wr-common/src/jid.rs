//! JID Helpers
//!
//! Canonical addressing for users, groups and the status broadcast list.

use std::sync::LazyLock;

use regex::Regex;

/// Suffix of a user (phone number) JID.
pub const USER_SUFFIX: &str = "@s.whatsapp.net";

/// Suffix of a group JID.
pub const GROUP_SUFFIX: &str = "@g.us";

/// Pseudo-conversation carrying status (stories) updates.
pub const STATUS_BROADCAST: &str = "status@broadcast";

/// Country code the digit-length heuristic applies to.
const BR_COUNTRY_CODE: &str = "55";

/// Area codes at or above this value lost the extra mobile digit.
const BR_AREA_CODE_THRESHOLD: u32 = 31;

/// `CC` `AA` extra-digit `NNNNNNNN`
static BR_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})(\d{2})\d(\d{8})$").expect("valid regex"));

static DEVICE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":\d+").expect("valid regex"));

/// Normalize a 13-digit Brazilian mobile number.
///
/// Numbers in area codes below 31 keep the ninth digit, numbers in area codes
/// 31 and above are sent without it. Anything else passes through unchanged.
///
/// # Examples
///
/// ```
/// use wr_common::jid::format_br_number;
///
/// assert_eq!(format_br_number("5531988887777"), "553188887777");
/// assert_eq!(format_br_number("5521988887777"), "5521988887777");
/// assert_eq!(format_br_number("14155550123"), "14155550123");
/// ```
pub fn format_br_number(number: &str) -> String {
    let Some(caps) = BR_NUMBER.captures(number) else {
        return number.to_string();
    };

    if &caps[1] != BR_COUNTRY_CODE {
        return number.to_string();
    }

    match caps[2].parse::<u32>() {
        Ok(ddd) if ddd >= BR_AREA_CODE_THRESHOLD => format!("{}{}{}", &caps[1], &caps[2], &caps[3]),
        _ => number.to_string(),
    }
}

/// Build a JID from a raw phone number or a pre-formed identifier.
///
/// Identifiers that already carry a user or group suffix only have their
/// local part normalized. Bare identifiers containing a hyphen are treated as
/// group ids, everything else as a phone number.
pub fn create_jid(number: &str) -> String {
    if number.contains(GROUP_SUFFIX) || number.contains(USER_SUFFIX) {
        return match number.split_once('@') {
            Some((local, domain)) => format!("{}@{domain}", format_br_number(local)),
            None => number.to_string(),
        };
    }

    if number.contains('-') {
        format!("{number}{GROUP_SUFFIX}")
    } else {
        format!("{}{USER_SUFFIX}", format_br_number(number))
    }
}

/// Strip the device suffix (`:12`) from a raw user id.
pub fn strip_device(id: &str) -> String {
    DEVICE_SUFFIX.replacen(id, 1, "").into_owned()
}

/// Whether the id carries a device suffix.
pub fn has_device_suffix(id: &str) -> bool {
    DEVICE_SUFFIX.is_match(id)
}

pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with(GROUP_SUFFIX)
}

pub fn is_user_jid(jid: &str) -> bool {
    jid.ends_with(USER_SUFFIX)
}

pub fn is_status_broadcast(jid: &str) -> bool {
    jid == STATUS_BROADCAST
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn br_number_high_area_code_drops_extra_digit() {
        assert_eq!(format_br_number("5531988887777"), "553188887777");
        assert_eq!(format_br_number("5599912345678"), "559912345678");
    }

    #[test]
    fn br_number_low_area_code_is_preserved() {
        assert_eq!(format_br_number("5521988887777"), "5521988887777");
        assert_eq!(format_br_number("5511912345678"), "5511912345678");
    }

    #[test]
    fn br_number_boundary_area_code() {
        assert_eq!(format_br_number("5530988887777"), "5530988887777");
        assert_eq!(format_br_number("5531988887777"), "553188887777");
    }

    #[test]
    fn non_br_or_non_matching_numbers_pass_through() {
        assert_eq!(format_br_number("4431988887777"), "4431988887777");
        assert_eq!(format_br_number("553188887777"), "553188887777");
        assert_eq!(format_br_number("abc"), "abc");
        assert_eq!(format_br_number(""), "");
    }

    #[test]
    fn create_jid_appends_user_suffix() {
        assert_eq!(create_jid("5531988887777"), "553188887777@s.whatsapp.net");
        assert_eq!(create_jid("5521988887777"), "5521988887777@s.whatsapp.net");
        assert_eq!(create_jid("14155550123"), "14155550123@s.whatsapp.net");
    }

    #[test]
    fn create_jid_appends_group_suffix_for_hyphenated_ids() {
        assert_eq!(create_jid("5511999999999-1612345678"), "5511999999999-1612345678@g.us");
    }

    #[test]
    fn create_jid_normalizes_only_local_part_of_suffixed_ids() {
        assert_eq!(create_jid("not-a-number@g.us"), "not-a-number@g.us");
        assert_eq!(
            create_jid("5531988887777@s.whatsapp.net"),
            "553188887777@s.whatsapp.net"
        );
        assert_eq!(
            create_jid("120363041234567890@g.us"),
            "120363041234567890@g.us"
        );
    }

    #[test]
    fn create_jid_is_deterministic() {
        let a = create_jid("5531988887777");
        let b = create_jid("5531988887777");
        assert_eq!(a, b);
    }

    #[test]
    fn strip_device_removes_first_suffix() {
        assert_eq!(
            strip_device("5511999999999:12@s.whatsapp.net"),
            "5511999999999@s.whatsapp.net"
        );
        assert_eq!(
            strip_device("5511999999999@s.whatsapp.net"),
            "5511999999999@s.whatsapp.net"
        );
    }

    #[test]
    fn jid_predicates() {
        assert!(is_group_jid("123-456@g.us"));
        assert!(!is_group_jid("123@s.whatsapp.net"));
        assert!(is_user_jid("123@s.whatsapp.net"));
        assert!(is_status_broadcast("status@broadcast"));
        assert!(has_device_suffix("123:4@s.whatsapp.net"));
        assert!(!has_device_suffix("123@s.whatsapp.net"));
    }
}
