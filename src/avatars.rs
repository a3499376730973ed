use std::io::Cursor;

use anyhow::Context;
use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use uuid::Uuid;

use crate::state::AppState;

pub const AVATAR_SIZE: u32 = 250;
pub const AVATAR_JPEG_QUALITY: u8 = 60;

/// Deterministic default avatar URL derived from the email hash.
pub fn gravatar_url(email: &str) -> String {
    let digest = md5::compute(email.trim().to_lowercase().as_bytes());
    format!("https://www.gravatar.com/avatar/{:x}", digest)
}

/// Object key an uploaded avatar lives under. One key per user, so a new
/// upload replaces the previous one.
pub fn avatar_key(user_id: Uuid) -> String {
    format!("avatars/{}.jpg", user_id)
}

/// Decode an uploaded image and re-encode it as a fixed-size square JPEG at
/// reduced quality. Fails if the input is not a decodable image.
pub fn render_square_jpeg(data: &[u8]) -> anyhow::Result<Bytes> {
    let img = image::load_from_memory(data).context("decode avatar image")?;
    let resized = img.resize_exact(AVATAR_SIZE, AVATAR_SIZE, FilterType::Triangle);

    let mut out = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut out), AVATAR_JPEG_QUALITY);
    resized
        .to_rgb8()
        .write_with_encoder(encoder)
        .context("encode avatar jpeg")?;
    Ok(Bytes::from(out))
}

/// Persist processed avatar bytes under the user's key and return the public
/// URL the stored image is reachable at.
pub async fn store_avatar(st: &AppState, user_id: Uuid, body: Bytes) -> anyhow::Result<String> {
    let key = avatar_key(user_id);
    st.storage
        .put_object(&key, body, "image/jpeg")
        .await
        .with_context(|| format!("put_object {}", key))?;
    Ok(format!(
        "{}/{}",
        st.config.storage.public_url.trim_end_matches('/'),
        key
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};

    #[test]
    fn gravatar_url_matches_known_hash() {
        // Reference hash from the gravatar documentation.
        assert_eq!(
            gravatar_url(" MyEmailAddress@example.com "),
            "https://www.gravatar.com/avatar/0bc83cb571cd1c50ba6f3e8a78ef1346"
        );
    }

    #[test]
    fn gravatar_url_is_case_insensitive() {
        assert_eq!(gravatar_url("A@B.com"), gravatar_url("a@b.com"));
    }

    #[test]
    fn render_square_jpeg_resizes_to_fixed_square() {
        let src = RgbaImage::from_pixel(8, 16, image::Rgba([120, 40, 200, 255]));
        let mut png = Vec::new();
        src.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let jpeg = render_square_jpeg(&png).unwrap();
        assert_eq!(
            image::guess_format(&jpeg).unwrap(),
            ImageFormat::Jpeg
        );

        let rendered = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(rendered.width(), AVATAR_SIZE);
        assert_eq!(rendered.height(), AVATAR_SIZE);
    }

    #[test]
    fn render_square_jpeg_rejects_garbage() {
        assert!(render_square_jpeg(b"definitely not an image").is_err());
    }

    #[tokio::test]
    async fn store_avatar_returns_public_url() {
        let state = crate::state::AppState::fake();
        let user_id = Uuid::new_v4();
        let url = store_avatar(&state, user_id, Bytes::from_static(b"jpeg bytes"))
            .await
            .unwrap();
        assert_eq!(
            url,
            format!("https://fake.local/avatars/{}.jpg", user_id)
        );
    }
}
