//! Integration tests for hiding containers in images and getting them back.

use pv_core::PvError;
use pv_crypto::KdfParams;
use pv_engine::{Engine, EngineOptions, Protection, RunOptions};
use pv_stego::{capacity, decode_image, encode_png, PixelBuffer};
use secrecy::SecretString;
use tempfile::TempDir;

fn engine() -> Engine {
    Engine::new(EngineOptions {
        chunk_size: 256,
        kdf: KdfParams { iterations: 100 },
        parallel: false,
        ..EngineOptions::default()
    })
    .expect("engine")
}

fn cover(width: u32, height: u32) -> PixelBuffer {
    let samples = (0..width as usize * height as usize)
        .flat_map(|i| {
            let v = (i % 251) as u8;
            [v, v.wrapping_mul(3), v.wrapping_add(91), 200]
        })
        .collect();
    PixelBuffer::from_rgba(width, height, samples).unwrap()
}

#[tokio::test]
async fn hide_and_reveal_through_png_file() {
    let tmp = TempDir::new().unwrap();
    let engine = engine();
    let run = RunOptions::default();
    let pw = SecretString::from("Secr3t!");
    let secret = b"meet at the usual place, 9pm".to_vec();

    let container = engine
        .encrypt_container(&secret, "msg.txt", "text/plain", Protection::Password(&pw), &run)
        .await
        .unwrap();
    let stego = engine.embed_container(cover(200, 200), &container, &run).await.unwrap();

    let path = tmp.path().join("holiday.png");
    std::fs::write(&path, encode_png(&stego).unwrap()).unwrap();
    let loaded = decode_image(&std::fs::read(&path).unwrap()).unwrap();

    let revealed = engine.reveal_container(&loaded, &run).await.unwrap();
    assert_eq!(revealed, container);

    let opened = engine.decrypt_container(&revealed, Some(&pw), &run).await.unwrap();
    assert_eq!(opened.plaintext, secret);
    assert_eq!(opened.filename, "msg.txt");
}

#[tokio::test]
async fn container_too_large_for_cover() {
    let engine = engine();
    let run = RunOptions::default();
    let container = engine
        .encrypt_container(&vec![7u8; 2000], "big.bin", "application/octet-stream", Protection::EmbeddedKey, &run)
        .await
        .unwrap();

    let original = cover(40, 40);
    assert!(container.len() > capacity(40, 40));
    let result = engine.embed_container(original, &container, &run).await;
    assert!(matches!(result, Err(PvError::Capacity { .. })));
}

#[tokio::test]
async fn non_container_payload_is_refused() {
    let engine = engine();
    let run = RunOptions::default();
    let result = engine.embed_container(cover(50, 50), b"definitely not a container", &run).await;
    assert!(matches!(result, Err(PvError::Format(_))));
}

#[tokio::test]
async fn clean_image_reveals_nothing() {
    let engine = engine();
    let run = RunOptions::default();
    // All LSBs zero: the header declares an empty payload
    let blank = PixelBuffer::from_rgba(64, 64, vec![0u8; 64 * 64 * 4]).unwrap();
    let result = engine.reveal_container(&blank, &run).await;
    assert!(matches!(result, Err(PvError::Corruption(_))));
}

#[tokio::test]
async fn stego_scenarios_in_200x200() {
    assert_eq!(capacity(200, 200), 14996);

    let payload: Vec<u8> = (0..100u8).collect();
    let mut px = cover(200, 200);
    pv_stego::embed(&mut px, &payload).unwrap();
    assert_eq!(pv_stego::extract(&px).unwrap(), payload);

    let original = cover(200, 200);
    let mut px = original.clone();
    let result = pv_stego::embed(&mut px, &vec![1u8; 14997]);
    assert!(matches!(result, Err(PvError::Capacity { needed: 14997, capacity: 14996 })));
    assert_eq!(px, original);
}
