use crate::models::Device;

/// Maps a raw device-selector value to a device category.
///
/// Text wins over codes: "android" anywhere means Android, then "iphone" or
/// "ios" means iOS. Only when neither appears is the value read as the
/// survey's numeric code (1 = iOS, 2 = Android).
pub fn classify_device(raw: Option<&str>) -> Device {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Device::Unknown;
    };

    let lowered = raw.to_lowercase();
    if lowered.contains("android") {
        return Device::Android;
    }
    if lowered.contains("iphone") || lowered.contains("ios") {
        return Device::Ios;
    }

    match raw.parse::<f64>() {
        Ok(code) if code == 1.0 => Device::Ios,
        Ok(code) if code == 2.0 => Device::Android,
        _ => Device::Unknown,
    }
}
