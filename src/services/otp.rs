use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Random numeric code of `length` digits. Leading zeros are kept.
pub fn generate_otp(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

// Only the digest is stored
pub fn hash_otp(otp: &str) -> String {
    format!("{:x}", Sha256::digest(otp.trim().as_bytes()))
}

/// Outcome of checking a submitted code against what is stored for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Missing,
    Expired,
    Mismatch,
    Valid,
}

impl OtpCheck {
    pub fn evaluate(
        stored_hash: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let (Some(stored_hash), Some(expires_at)) = (stored_hash, expires_at) else {
            return OtpCheck::Missing;
        };
        if now > expires_at {
            return OtpCheck::Expired;
        }
        if hash_otp(submitted) != stored_hash {
            return OtpCheck::Mismatch;
        }
        OtpCheck::Valid
    }

    pub fn message(&self) -> &'static str {
        match self {
            OtpCheck::Missing => "No OTP found. Request a new one.",
            OtpCheck::Expired => "OTP has expired. Request a new one.",
            OtpCheck::Mismatch => "Invalid OTP.",
            OtpCheck::Valid => "Email verified successfully!",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn generated_codes_are_numeric() {
        for len in [4, 6, 8] {
            let otp = generate_otp(len);
            assert_eq!(otp.len(), len);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn hash_is_hex_sha256() {
        let hash = hash_otp("123456");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, "8d969eef6ecad3c29a3a629280e686cf0c3f5d5a86aff3ca12020c923adc6c92");
        assert_eq!(hash_otp(" 123456 "), hash);
    }

    #[test]
    fn evaluate_outcomes() {
        let now = Utc::now();
        let stored = hash_otp("482913");
        let later = Some(now + Duration::minutes(10));

        assert_eq!(OtpCheck::evaluate(None, later, "482913", now), OtpCheck::Missing);
        assert_eq!(OtpCheck::evaluate(Some(&stored), None, "482913", now), OtpCheck::Missing);
        assert_eq!(
            OtpCheck::evaluate(Some(&stored), Some(now - Duration::seconds(1)), "482913", now),
            OtpCheck::Expired
        );
        assert_eq!(OtpCheck::evaluate(Some(&stored), later, "000000", now), OtpCheck::Mismatch);
        assert_eq!(OtpCheck::evaluate(Some(&stored), later, "482913", now), OtpCheck::Valid);
    }

    #[test]
    fn expiry_beats_mismatch() {
        let now = Utc::now();
        let stored = hash_otp("482913");
        let check = OtpCheck::evaluate(Some(&stored), Some(now - Duration::minutes(1)), "111111", now);
        assert_eq!(check, OtpCheck::Expired);
        assert_eq!(check.message(), "OTP has expired. Request a new one.");
    }
}
