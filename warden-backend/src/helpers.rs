use md5::Md5;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub fn hash_api_key(key: &str) -> String {
  format!("{:x}", Sha256::digest(key.as_bytes()))
}

pub fn now() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs() as i64)
    .unwrap_or_default()
}

/// UUID an offline-mode server assigns to `name`: the raw MD5 of
/// `OfflinePlayer:<name>`.
pub fn offline_uuid(name: &str) -> Uuid {
  let digest = Md5::digest(format!("OfflinePlayer:{name}").as_bytes());
  let mut bytes = [0u8; 16];
  bytes.copy_from_slice(&digest);
  Uuid::from_bytes(bytes)
}

/// Hyphen-stripped form used by the skin services. Works on whatever an
/// authority file happens to hold, parseable or not.
pub fn compact_uuid(uuid: &str) -> String {
  uuid.replace('-', "")
}

pub fn avatar_url(uuid: &str) -> String {
  format!("https://minotar.net/helm/{}/256.png", compact_uuid(uuid))
}

pub fn render_url(uuid: &str) -> String {
  format!(
    "https://render.skinmc.net/3d.php?user={}&vr=-20&hr=30&hrh=0&vrll=-20&vrrl=10&vrla=10&vrra=-10&ratio=20",
    compact_uuid(uuid)
  )
}
