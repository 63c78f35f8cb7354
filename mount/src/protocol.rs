//! Mount command protocol definitions
//!
//! Commands travel as `:<cmd>#`. Replies are either `#`-terminated text,
//! a single status character, or nothing at all depending on the command.

use crate::error::{MountError, MountResult};
use serde::{Deserialize, Serialize};

/// Default command port of the mount
pub const MOUNT_DEFAULT_PORT: u16 = 3490;

/// Frame prefix
pub const COMMAND_PREFIX: char = ':';

/// Frame terminator (also terminates text replies)
pub const COMMAND_TERMINATOR: char = '#';

/// Command mnemonics
pub mod commands {
    // Status
    pub const GET_STATUS: &str = "Ginfo";
    pub const GET_SIDEREAL_TIME: &str = "GS";
    pub const GET_SLEW_RATE: &str = "GMs";
    pub const GET_TIME_TO_FLIP: &str = "Gmte";
    pub const GET_MERIDIAN_LIMIT_TRACK: &str = "Glmt";
    pub const GET_MERIDIAN_LIMIT_SLEW: &str = "Glms";
    pub const GET_REFRACTION_TEMPERATURE: &str = "GRTMP";
    pub const GET_REFRACTION_PRESSURE: &str = "GRPRS";
    pub const GET_TELESCOPE_TEMPERATURE: &str = "GTMP1";
    pub const GET_REFRACTION_STATUS: &str = "GREF";
    pub const GET_UNATTENDED_FLIP: &str = "Guaf";
    pub const GET_DUAL_AXIS_TRACKING: &str = "Gdat";
    pub const GET_HORIZON_LIMIT_HIGH: &str = "Gh";
    pub const GET_HORIZON_LIMIT_LOW: &str = "Go";
    pub const GET_UTC_DATA: &str = "GDUTV";

    // Site and firmware
    pub const SET_ULTRA_PRECISION: &str = "U2";
    pub const GET_SITE_ELEVATION: &str = "Gev";
    pub const GET_SITE_LONGITUDE: &str = "Gg";
    pub const GET_SITE_LATITUDE: &str = "Gt";
    pub const GET_FIRMWARE_DATE: &str = "GVD";
    pub const GET_FIRMWARE_NUMBER: &str = "GVN";
    pub const GET_PRODUCT_NAME: &str = "GVP";
    pub const GET_FIRMWARE_TIME: &str = "GVT";
    pub const GET_HARDWARE_VERSION: &str = "GVZ";

    // Motion
    pub const SET_TARGET_AZIMUTH: &str = "Sz";
    pub const SET_TARGET_ALTITUDE: &str = "Sa";
    pub const SLEW_TO_TARGET: &str = "MS";
    pub const UNPARK: &str = "PO";
    pub const TRACKING_ON: &str = "AP";
    pub const TRACKING_OFF: &str = "RT9";

    // Refraction
    pub const SET_REFRACTION_PRESSURE: &str = "SRPRS";
    pub const SET_REFRACTION_TEMPERATURE: &str = "SRTMP";

    // Alignment model
    pub const SET_TARGET_RA: &str = "Sr";
    pub const SET_TARGET_DEC: &str = "Sd";
    pub const SYNC_REFINE: &str = "CMS";
    pub const SYNC_CONFIG_PLAIN: &str = "CMCFG0";
    pub const SYNC: &str = "CM";
    pub const GET_MODEL_STAR_COUNT: &str = "getalst";
    pub const CLEAR_MODEL: &str = "delalig";
    pub const NEW_ALIGNMENT: &str = "newalig";
    pub const NEW_ALIGNMENT_POINT: &str = "newalpt";
    pub const END_ALIGNMENT: &str = "endalig";
}

/// Firmware number from which the UTC data query is supported
pub const UTC_DATA_MIN_FIRMWARE: u32 = 21500;

/// Shape of the reply a command produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Text terminated by `#`
    Terminated,
    /// Exactly one status character, no terminator
    SingleChar,
    /// The mount sends nothing back
    None,
}

/// Determine the reply grammar of a command from its mnemonic
pub fn reply_kind(command: &str) -> ReplyKind {
    use commands::*;

    const SILENT: &[&str] = &[UNPARK, TRACKING_ON, TRACKING_OFF, SET_ULTRA_PRECISION];
    const SINGLE_PREFIXES: &[&str] = &[
        SET_REFRACTION_PRESSURE,
        SET_REFRACTION_TEMPERATURE,
        SYNC_CONFIG_PLAIN,
        SET_TARGET_AZIMUTH,
        SET_TARGET_ALTITUDE,
        SET_TARGET_RA,
        SET_TARGET_DEC,
    ];

    if SILENT.contains(&command) {
        return ReplyKind::None;
    }
    if command == SLEW_TO_TARGET || SINGLE_PREFIXES.iter().any(|p| command.starts_with(p)) {
        return ReplyKind::SingleChar;
    }
    ReplyKind::Terminated
}

/// Wrap a command mnemonic into its wire frame
pub fn frame_command(command: &str) -> String {
    format!("{}{}{}", COMMAND_PREFIX, command, COMMAND_TERMINATOR)
}

/// Side of the pier the mount is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PierSide {
    East,
    West,
}

impl PierSide {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "E" | "e" | "0" => Some(PierSide::East),
            "W" | "w" | "1" => Some(PierSide::West),
            _ => None,
        }
    }

    pub fn code(&self) -> char {
        match self {
            PierSide::East => 'E',
            PierSide::West => 'W',
        }
    }
}

/// Parsed `Ginfo` reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GinfoStatus {
    /// Right ascension of date in hours
    pub ra_jnow: f64,
    /// Declination of date in degrees
    pub dec_jnow: f64,
    pub pier_side: PierSide,
    pub azimuth: f64,
    pub altitude: f64,
    pub julian_date: String,
    /// Mount status code (0 = tracking)
    pub status: i32,
    pub slewing: bool,
}

/// Parse the 8 comma separated `Ginfo` fields
pub fn parse_ginfo(reply: &str) -> MountResult<GinfoStatus> {
    let malformed = |reason: String| MountError::MalformedReply {
        command: commands::GET_STATUS.to_string(),
        reply: reply.to_string(),
        reason,
    };

    let fields: Vec<&str> = reply.trim().split(',').collect();
    if fields.len() != 8 {
        return Err(malformed(format!("expected 8 fields, got {}", fields.len())));
    }

    let number = |idx: usize, name: &str| -> MountResult<f64> {
        fields[idx]
            .trim()
            .parse::<f64>()
            .map_err(|e| malformed(format!("{}: {}", name, e)))
    };

    let pier_side = PierSide::from_code(fields[2])
        .ok_or_else(|| malformed(format!("unknown pier side '{}'", fields[2])))?;
    let status = fields[6]
        .trim()
        .parse::<i32>()
        .map_err(|e| malformed(format!("status: {}", e)))?;

    Ok(GinfoStatus {
        ra_jnow: number(0, "ra")?,
        dec_jnow: number(1, "dec")?,
        pier_side,
        azimuth: number(3, "azimuth")?,
        altitude: number(4, "altitude")?,
        julian_date: fields[5].trim().to_string(),
        status,
        slewing: fields[7].trim() == "1",
    })
}

/// Sexagesimal value that could not be parsed
#[derive(Debug, Clone, PartialEq)]
pub struct SexagesimalError(pub String);

impl std::error::Error for SexagesimalError {}

impl std::fmt::Display for SexagesimalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid sexagesimal value '{}'", self.0)
    }
}

/// Parse `[+-]DD[*:]MM[:SS[.s]]` or a plain decimal into a decimal value
pub fn parse_sexagesimal(text: &str) -> Result<f64, SexagesimalError> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<f64>() {
        return Ok(value);
    }

    let (negative, body) = match trimmed.chars().next() {
        Some('-') => (true, &trimmed[1..]),
        Some('+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let parts: Vec<&str> = body.split(|c| c == ':' || c == '*' || c == '\'').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(SexagesimalError(text.to_string()));
    }

    let mut value = 0.0;
    let mut divisor = 1.0;
    for part in parts {
        let v: f64 = part
            .trim()
            .parse()
            .map_err(|_| SexagesimalError(text.to_string()))?;
        value += v / divisor;
        divisor *= 60.0;
    }

    Ok(if negative { -value } else { value })
}

/// `Sz` target: integer degrees and rounded arc minutes
pub fn format_azimuth_target(azimuth: f64) -> String {
    let total_minutes = (azimuth.rem_euclid(360.0) * 60.0).round() as i64 % (360 * 60);
    format!(
        "{}{:03}*{:02}",
        commands::SET_TARGET_AZIMUTH,
        total_minutes / 60,
        total_minutes % 60
    )
}

/// `Sa` target: signed integer degrees and rounded arc minutes
pub fn format_altitude_target(altitude: f64) -> String {
    let sign = if altitude < 0.0 { '-' } else { '+' };
    let total_minutes = (altitude.abs() * 60.0).round() as i64;
    format!(
        "{}{}{:02}*{:02}",
        commands::SET_TARGET_ALTITUDE,
        sign,
        total_minutes / 60,
        total_minutes % 60
    )
}

/// Seconds part with a fixed number of decimals from scaled integer units
fn format_seconds(units: i64, scale: i64, decimals: usize) -> String {
    if decimals == 0 {
        format!("{:02}", units)
    } else {
        format!("{:02}.{:0width$}", units / scale, units % scale, width = decimals)
    }
}

/// Hours as `HH:MM:SS.<decimals>`
pub fn format_hours(hours: f64, decimals: usize) -> String {
    let scale = 10i64.pow(decimals as u32);
    let day = 24 * 3600 * scale;
    let total = (hours.rem_euclid(24.0) * 3600.0 * scale as f64).round() as i64 % day;
    let h = total / (3600 * scale);
    let m = (total % (3600 * scale)) / (60 * scale);
    let s = total % (60 * scale);
    format!("{:02}:{:02}:{}", h, m, format_seconds(s, scale, decimals))
}

/// Degrees as `sDD<sep>MM:SS.<decimals>`
pub fn format_degrees(degrees: f64, separator: char, decimals: usize) -> String {
    let sign = if degrees < 0.0 { '-' } else { '+' };
    let scale = 10i64.pow(decimals as u32);
    let total = (degrees.abs() * 3600.0 * scale as f64).round() as i64;
    let d = total / (3600 * scale);
    let m = (total % (3600 * scale)) / (60 * scale);
    let s = total % (60 * scale);
    format!(
        "{}{:02}{}{:02}:{}",
        sign,
        d,
        separator,
        m,
        format_seconds(s, scale, decimals)
    )
}

/// `Sr` target right ascension (hours)
pub fn format_ra_target(ra_hours: f64) -> String {
    format!("{}{}", commands::SET_TARGET_RA, format_hours(ra_hours, 2))
}

/// `Sd` target declination (degrees)
pub fn format_dec_target(dec_degrees: f64) -> String {
    format!("{}{}", commands::SET_TARGET_DEC, format_degrees(dec_degrees, '*', 1))
}

/// `SRPRS` refraction pressure in hPa
pub fn format_refraction_pressure(pressure_hpa: f64) -> String {
    format!("{}{:06.1}", commands::SET_REFRACTION_PRESSURE, pressure_hpa)
}

/// `SRTMP` refraction temperature in degrees Celsius
pub fn format_refraction_temperature(temperature_c: f64) -> String {
    let sign = if temperature_c < 0.0 { '-' } else { '+' };
    format!(
        "{}{}{:05.1}",
        commands::SET_REFRACTION_TEMPERATURE,
        sign,
        temperature_c.abs()
    )
}

/// Refraction inputs the mount accepts
pub fn refraction_in_range(temperature_c: f64, pressure_hpa: f64) -> bool {
    (900.0..=1100.0).contains(&pressure_hpa) && (-40.0..=50.0).contains(&temperature_c)
}

/// One `newalpt` batch point: measured and solved positions of date
pub fn format_batch_point(
    ra_jnow: f64,
    dec_jnow: f64,
    pier_side: PierSide,
    ra_jnow_solved: f64,
    dec_jnow_solved: f64,
    sidereal_time_hours: f64,
) -> String {
    format!(
        "{}{},{},{},{},{},{}",
        commands::NEW_ALIGNMENT_POINT,
        format_hours(ra_jnow, 1),
        format_degrees(dec_jnow, ':', 0),
        pier_side.code(),
        format_hours(ra_jnow_solved, 1),
        format_degrees(dec_jnow_solved, ':', 0),
        format_hours(sidereal_time_hours, 1)
    )
}

/// `GVN` firmware number `a.b.c` to `a*10000 + b*100 + c`
pub fn parse_firmware_number(reply: &str) -> MountResult<u32> {
    let malformed = |reason: &str| MountError::MalformedReply {
        command: commands::GET_FIRMWARE_NUMBER.to_string(),
        reply: reply.to_string(),
        reason: reason.to_string(),
    };

    let parts: Vec<u32> = reply
        .trim()
        .split('.')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| malformed("non-numeric component"))?;

    match parts.as_slice() {
        [a, b, c] => Ok(a * 10000 + b * 100 + c),
        [a, b] => Ok(a * 10000 + b * 100),
        _ => Err(malformed("expected a.b.c")),
    }
}

/// Parse a signed integer reply such as `Gmte` or `Glmt`
pub fn parse_int_reply(command: &str, reply: &str) -> MountResult<i32> {
    reply
        .trim()
        .trim_start_matches('+')
        .parse::<i32>()
        .map_err(|e| MountError::MalformedReply {
            command: command.to_string(),
            reply: reply.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a decimal reply such as `GRTMP` or `GRPRS`
pub fn parse_float_reply(command: &str, reply: &str) -> MountResult<f64> {
    reply
        .trim()
        .trim_start_matches('+')
        .parse::<f64>()
        .map_err(|e| MountError::MalformedReply {
            command: command.to_string(),
            reply: reply.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_command() {
        assert_eq!(frame_command("Ginfo"), ":Ginfo#");
        assert_eq!(frame_command("MS"), ":MS#");
    }

    #[test]
    fn test_reply_kinds() {
        assert_eq!(reply_kind("PO"), ReplyKind::None);
        assert_eq!(reply_kind("AP"), ReplyKind::None);
        assert_eq!(reply_kind("RT9"), ReplyKind::None);
        assert_eq!(reply_kind("MS"), ReplyKind::SingleChar);
        assert_eq!(reply_kind("Sz120*30"), ReplyKind::SingleChar);
        assert_eq!(reply_kind("Sa+45*00"), ReplyKind::SingleChar);
        assert_eq!(reply_kind("Sr10:00:00.00"), ReplyKind::SingleChar);
        assert_eq!(reply_kind("Sd+45*00:00.0"), ReplyKind::SingleChar);
        assert_eq!(reply_kind("SRPRS1013.0"), ReplyKind::SingleChar);
        assert_eq!(reply_kind("CMCFG0"), ReplyKind::SingleChar);
        assert_eq!(reply_kind("CMS"), ReplyKind::Terminated);
        assert_eq!(reply_kind("CM"), ReplyKind::Terminated);
        assert_eq!(reply_kind("Ginfo"), ReplyKind::Terminated);
        assert_eq!(reply_kind("GS"), ReplyKind::Terminated);
        assert_eq!(reply_kind("getalst"), ReplyKind::Terminated);
        assert_eq!(reply_kind("MSx"), ReplyKind::Terminated);
    }

    #[test]
    fn test_parse_ginfo() {
        let status = parse_ginfo("10.5000,45.2500,W,120.1234,44.9876,2458000.12345,0,1").unwrap();
        assert!((status.ra_jnow - 10.5).abs() < 1e-9);
        assert!((status.dec_jnow - 45.25).abs() < 1e-9);
        assert_eq!(status.pier_side, PierSide::West);
        assert!((status.azimuth - 120.1234).abs() < 1e-9);
        assert_eq!(status.julian_date, "2458000.12345");
        assert_eq!(status.status, 0);
        assert!(status.slewing);

        let idle = parse_ginfo("1.0,-5.0,E,10.0,30.0,2458000.5,7,0").unwrap();
        assert_eq!(idle.pier_side, PierSide::East);
        assert!(!idle.slewing);
    }

    #[test]
    fn test_parse_ginfo_wrong_field_count() {
        let err = parse_ginfo("10.5,45.2,W,120.1,44.9,2458000.1,0").unwrap_err();
        match err {
            MountError::MalformedReply { command, reason, .. } => {
                assert_eq!(command, "Ginfo");
                assert!(reason.contains("7"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(parse_ginfo("").is_err());
    }

    #[test]
    fn test_parse_ginfo_bad_number() {
        assert!(parse_ginfo("abc,45.2,W,120.1,44.9,2458000.1,0,0").is_err());
        assert!(parse_ginfo("10.5,45.2,X,120.1,44.9,2458000.1,0,0").is_err());
    }

    #[test]
    fn test_format_slew_targets() {
        assert_eq!(format_azimuth_target(120.5), "Sz120*30");
        assert_eq!(format_azimuth_target(5.0), "Sz005*00");
        assert_eq!(format_azimuth_target(359.999), "Sz000*00");
        assert_eq!(format_altitude_target(45.25), "Sa+45*15");
        assert_eq!(format_altitude_target(7.0), "Sa+07*00");
        assert_eq!(format_altitude_target(-3.5), "Sa-03*30");
    }

    #[test]
    fn test_format_ra_dec_targets() {
        assert_eq!(format_ra_target(10.5), "Sr10:30:00.00");
        assert_eq!(format_dec_target(45.5), "Sd+45*30:00.0");
        assert_eq!(format_dec_target(-12.25), "Sd-12*15:00.0");
    }

    #[test]
    fn test_format_hours_carries_rounding() {
        assert_eq!(format_hours(0.999999999, 1), "01:00:00.0");
        assert_eq!(format_hours(23.99999999, 1), "00:00:00.0");
        assert_eq!(format_hours(-1.0, 0), "23:00:00");
    }

    #[test]
    fn test_parse_sexagesimal() {
        assert!((parse_sexagesimal("+45*30:00").unwrap() - 45.5).abs() < 1e-9);
        assert!((parse_sexagesimal("-12:15").unwrap() + 12.25).abs() < 1e-9);
        assert!((parse_sexagesimal("10:30:00.0").unwrap() - 10.5).abs() < 1e-9);
        assert!((parse_sexagesimal("1234.5").unwrap() - 1234.5).abs() < 1e-9);
        assert!(parse_sexagesimal("ab:cd").is_err());
        assert_eq!(
            parse_sexagesimal("1:2:3:4").unwrap_err().to_string(),
            "invalid sexagesimal value '1:2:3:4'"
        );
    }

    #[test]
    fn test_parse_firmware_number() {
        assert_eq!(parse_firmware_number("2.15.1").unwrap(), 21501);
        assert_eq!(parse_firmware_number("2.9.19").unwrap(), 20919);
        assert!(parse_firmware_number("2.x.1").is_err());
        assert!(parse_firmware_number("2").is_err());
    }

    #[test]
    fn test_refraction_formatting_and_range() {
        assert_eq!(format_refraction_pressure(1013.0), "SRPRS1013.0");
        assert_eq!(format_refraction_pressure(950.0), "SRPRS0950.0");
        assert_eq!(format_refraction_temperature(-5.5), "SRTMP-005.5");
        assert_eq!(format_refraction_temperature(12.0), "SRTMP+012.0");
        assert!(refraction_in_range(10.0, 1013.0));
        assert!(!refraction_in_range(10.0, 800.0));
        assert!(!refraction_in_range(60.0, 1013.0));
    }

    #[test]
    fn test_format_batch_point() {
        let cmd = format_batch_point(10.5, 45.5, PierSide::West, 10.5, 45.5, 6.25);
        assert_eq!(
            cmd,
            "newalpt10:30:00.0,+45:30:00,W,10:30:00.0,+45:30:00,06:15:00.0"
        );
    }

    #[test]
    fn test_parse_int_reply() {
        assert_eq!(parse_int_reply("Glmt", "+05").unwrap(), 5);
        assert_eq!(parse_int_reply("Gmte", "0120").unwrap(), 120);
        assert!(parse_int_reply("Gmte", "").is_err());
    }
}
