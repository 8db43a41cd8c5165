use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

// Добавляет схему `stun:` к URL ICE сервера, если она отсутствует
pub fn add_ice_url_scheme(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("stun:") || url.starts_with("stuns:") {
        url.to_string()
    } else {
        format!("stun:{}", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_id_is_16_hex_chars() {
        let id = random_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, random_id());
    }

    #[test]
    fn scheme_is_added_once() {
        assert_eq!(
            add_ice_url_scheme("stun.l.google.com:19302"),
            "stun:stun.l.google.com:19302"
        );
        assert_eq!(
            add_ice_url_scheme("stun:stun1.l.google.com:19302"),
            "stun:stun1.l.google.com:19302"
        );
    }
}
