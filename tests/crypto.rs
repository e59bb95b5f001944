use lina::compression::{SegmentCompressor, SegmentDecompressor};
use lina::crypto::{KeySchedule, SegmentCipher};
use lina::error::LinaError;
use lina::format::{CipherAlgo, Profile, SALT_LEN};
use lina::keys::{PrivateKey, SymmetricKey, PRIVATE_KEY_LEN, PUBLIC_KEY_LEN};

fn schedule(profile: Profile, key_byte: u8) -> KeySchedule {
    let key = SymmetricKey::from_bytes(&[key_byte; 32]).unwrap();
    KeySchedule::derive(profile, &[9u8; SALT_LEN], Some(&key), None).unwrap()
}

#[test]
fn x963_layout_roundtrips() {
    let key = PrivateKey::generate().unwrap();
    let raw = key.to_x963();
    assert_eq!(raw.len(), PRIVATE_KEY_LEN);
    assert_eq!(raw[0], 0x04);
    let parsed = PrivateKey::from_x963(&raw).unwrap();
    assert_eq!(parsed.public_key(), key.public_key());
}

#[test]
fn mismatched_public_half_is_rejected() {
    let a = PrivateKey::generate().unwrap().to_x963();
    let b = PrivateKey::generate().unwrap().to_x963();
    let mut mixed = a[..PUBLIC_KEY_LEN].to_vec();
    mixed.extend_from_slice(&b[PUBLIC_KEY_LEN..]);
    assert!(matches!(
        PrivateKey::from_x963(&mixed),
        Err(LinaError::InvalidKeyFormat(_))
    ));
}

#[test]
fn zero_scalar_is_rejected() {
    let mut raw = PrivateKey::generate().unwrap().to_x963().to_vec();
    raw[PUBLIC_KEY_LEN..].fill(0);
    assert!(matches!(
        PrivateKey::from_x963(&raw),
        Err(LinaError::InvalidKeyFormat(_))
    ));
}

#[test]
fn signatures_verify_with_public_half() {
    let key = PrivateKey::generate().unwrap();
    let sig = key.sign(b"payload").unwrap();
    key.public_key().verify(b"payload", &sig).unwrap();
    assert!(matches!(
        key.public_key().verify(b"other", &sig),
        Err(LinaError::AuthenticationFailed)
    ));
}

#[test]
fn aead_segments_open_in_order() {
    let keys = schedule(Profile::Symmetric, 1);
    let mut sealer = SegmentCipher::new(CipherAlgo::ChaCha20Poly1305, &keys).unwrap();
    let header = [1u8, 0, 0, 0, 1, 0, 0, 0];
    let mut first = b"a".to_vec();
    let mut second = b"b".to_vec();
    let tag1 = sealer.seal(&header, &mut first).unwrap();
    let tag2 = sealer.seal(&header, &mut second).unwrap();

    // swapped order must fail
    let mut opener = SegmentCipher::new(CipherAlgo::ChaCha20Poly1305, &keys).unwrap();
    let mut swapped = second.clone();
    assert!(matches!(
        opener.open(&header, &mut swapped, &tag2),
        Err(LinaError::AuthenticationFailed)
    ));

    let mut opener = SegmentCipher::new(CipherAlgo::ChaCha20Poly1305, &keys).unwrap();
    opener.open(&header, &mut first, &tag1).unwrap();
    opener.open(&header, &mut second, &tag2).unwrap();
    assert_eq!(first, b"a");
    assert_eq!(second, b"b");
}

#[test]
fn different_keys_derive_different_root_macs() {
    let a = schedule(Profile::Symmetric, 1).root_mac(&[&b"x"[..]]).unwrap();
    let b = schedule(Profile::Symmetric, 2).root_mac(&[&b"x"[..]]).unwrap();
    assert_ne!(a, b);
}

#[test]
fn missing_key_material_is_reported() {
    let err = KeySchedule::derive(Profile::Signed, &[0u8; SALT_LEN], None, None)
        .err()
        .unwrap();
    assert!(err.to_string().contains("signing public key"));
}

#[test]
fn incompressible_segments_stay_raw() {
    let mut compressor = SegmentCompressor::new(6).unwrap();
    let noise: Vec<u8> = (0..4096u32)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
        .collect();
    let text = b"lina ".repeat(1000);

    assert!(compressor.compress(&text).unwrap().is_some());
    if let Some(packed) = compressor.compress(&noise).unwrap() {
        assert!(packed.len() < noise.len());
    }
    assert!(compressor.compress(b"x").unwrap().is_none());
}

#[test]
fn decompress_checks_length() {
    let mut compressor = SegmentCompressor::new(3).unwrap();
    let text = b"segment ".repeat(512);
    let packed = compressor.compress(&text).unwrap().unwrap();
    let mut decompressor = SegmentDecompressor::new().unwrap();
    assert_eq!(decompressor.decompress(&packed, text.len()).unwrap(), text);
    assert!(decompressor.decompress(&packed, text.len() + 1).is_err());
}
