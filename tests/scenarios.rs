use std::sync::Arc;

use serde_json::{Value, json};
use zarrkv::{
    ArrayMetadata, CodecSpec, DTypeDescriptor, FillValue, Hierarchy, MemoryBackend, NodeKind,
    PrimitiveType, StorageBackend, ZarrError, path,
};

fn dtype(s: &str) -> DTypeDescriptor {
    s.parse::<PrimitiveType>().unwrap().into()
}

async fn zarray_json(store: &MemoryBackend, key: &str) -> Value {
    let bytes = store.get(key).await.unwrap().unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn nested_array_creates_every_ancestor_group() {
    let store = Arc::new(MemoryBackend::new());
    let hierarchy = Hierarchy::new(store.clone());
    hierarchy
        .create_array_at("a/b/c", ArrayMetadata::new(vec![1], vec![1], dtype("|b1")))
        .await
        .unwrap();

    assert_eq!(
        store.keys().unwrap(),
        vec![".zgroup", "a/.zgroup", "a/b/.zgroup", "a/b/c/.zarray"]
    );
    for key in [".zgroup", "a/.zgroup", "a/b/.zgroup"] {
        assert_eq!(zarray_json(&store, key).await, json!({"zarr_format": 2}));
    }
    assert_eq!(
        hierarchy.list_children("a/b").await.unwrap(),
        vec![("c".to_string(), NodeKind::Array)]
    );
}

#[tokio::test]
async fn ensure_group_is_idempotent() {
    let store = Arc::new(MemoryBackend::new());
    let hierarchy = Hierarchy::new(store.clone());

    hierarchy.ensure_group("x/y").await.unwrap();
    let mut first = Vec::new();
    for key in store.keys().unwrap() {
        first.push((key.clone(), store.get(&key).await.unwrap()));
    }

    hierarchy.ensure_group("/x//y/").await.unwrap();
    let mut second = Vec::new();
    for key in store.keys().unwrap() {
        second.push((key.clone(), store.get(&key).await.unwrap()));
    }
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[tokio::test]
async fn unwritten_chunks_read_as_fill_value() {
    let store = Arc::new(MemoryBackend::new());
    let hierarchy = Hierarchy::new(store.clone());
    let md = ArrayMetadata::new(vec![20, 20], vec![10, 10], dtype("<f8"))
        .with_compressor(Some(CodecSpec::new("zstd").with_param("level", 3)))
        .with_fill_value(Some(FillValue::Float(42.5)));
    let array = hierarchy.create_array_at("", md).await.unwrap();

    // Nothing written: a uniform block of fill, and only the metadata key.
    let block = array.read_chunk(&[1, 1]).await.unwrap();
    assert_eq!(block.len(), 10 * 10 * 8);
    assert!(
        block
            .chunks_exact(8)
            .all(|e| f64::from_le_bytes(e.try_into().unwrap()) == 42.5)
    );
    assert_eq!(store.keys().unwrap(), vec![".zarray"]);

    let raw: Vec<u8> = (0..100).flat_map(|i| (i as f64 * 0.5).to_le_bytes()).collect();
    array.write_chunk(&[0, 0], &raw).await.unwrap();
    assert_eq!(store.keys().unwrap(), vec![".zarray", "0.0"]);
    assert_eq!(array.read_chunk(&[0, 0]).await.unwrap(), raw);
    assert_eq!(array.read_chunk(&[1, 1]).await.unwrap(), block);
}

#[tokio::test]
async fn structured_fill_value_is_base64() {
    let store = Arc::new(MemoryBackend::new());
    let hierarchy = Hierarchy::new(store.clone());
    let rgb = DTypeDescriptor::parse(&json!([["r", "|u1"], ["g", "|u1"], ["b", "|u1"]])).unwrap();
    let md = ArrayMetadata::new(vec![4], vec![2], rgb)
        .with_fill_value(Some(FillValue::Bytes(vec![10, 20, 30])));
    let array = hierarchy.create_array_at("pixels", md).await.unwrap();

    let doc = zarray_json(&store, "pixels/.zarray").await;
    assert_eq!(doc["fill_value"], json!("ChQe"));
    assert_eq!(doc["dtype"], json!([["r", "|u1"], ["g", "|u1"], ["b", "|u1"]]));

    let reopened = hierarchy.open_array("pixels").await.unwrap();
    assert_eq!(
        reopened.metadata().fill_value,
        Some(FillValue::Bytes(vec![10, 20, 30]))
    );
    assert_eq!(array.read_chunk(&[1]).await.unwrap(), vec![10, 20, 30, 10, 20, 30]);
}

#[tokio::test]
async fn nan_fill_survives_metadata_round_trip() {
    let store = Arc::new(MemoryBackend::new());
    let hierarchy = Hierarchy::new(store.clone());
    for (name, fill, literal) in [
        ("nan", FillValue::NaN, "NaN"),
        ("inf", FillValue::Infinity, "Infinity"),
        ("ninf", FillValue::NegativeInfinity, "-Infinity"),
    ] {
        let md = ArrayMetadata::new(vec![2], vec![2], dtype("<f4")).with_fill_value(Some(fill.clone()));
        hierarchy.create_array_at(name, md).await.unwrap();
        let doc = zarray_json(&store, &format!("{name}/.zarray")).await;
        assert_eq!(doc["fill_value"], json!(literal));
        let opened = hierarchy.open_array(name).await.unwrap();
        assert_eq!(opened.metadata().fill_value, Some(fill));
    }
    let nan_chunk = hierarchy.open_array("nan").await.unwrap().read_chunk(&[0]).await.unwrap();
    assert!(f32::from_le_bytes(nan_chunk[..4].try_into().unwrap()).is_nan());
}

#[tokio::test]
async fn created_and_reopened_handles_agree_on_fill() {
    let store = Arc::new(MemoryBackend::new());
    let hierarchy = Hierarchy::new(store);
    for (name, dt, fill, element) in [
        ("signed", "<i4", FillValue::UInt(5), 5i32.to_le_bytes().to_vec()),
        ("unsigned", ">u2", FillValue::Int(7), vec![0, 7]),
    ] {
        let md = ArrayMetadata::new(vec![3], vec![3], dtype(dt)).with_fill_value(Some(fill));
        let created = hierarchy.create_array_at(name, md).await.unwrap();
        let reopened = hierarchy.open_array(name).await.unwrap();
        let expected = element.repeat(3);
        assert_eq!(created.read_chunk(&[0]).await.unwrap(), expected, "{name}");
        assert_eq!(reopened.read_chunk(&[0]).await.unwrap(), expected, "{name}");
    }
}

#[tokio::test]
async fn oversized_chunks_fail_to_open() {
    let store = Arc::new(MemoryBackend::new());
    let hierarchy = Hierarchy::new(store.clone());
    store
        .put(
            "big/.zarray",
            bytes::Bytes::from_static(
                br#"{"zarr_format": 2, "shape": [4, 4], "chunks": [8589934592, 8589934592],
                     "dtype": "<f8", "compressor": null, "fill_value": 0.0,
                     "order": "C", "filters": null}"#,
            ),
        )
        .await
        .unwrap();
    assert!(matches!(
        hierarchy.open_array("big").await,
        Err(ZarrError::InvalidMetadata(_))
    ));

    store
        .put(
            "wide/.zarray",
            bytes::Bytes::from_static(
                br#"{"zarr_format": 2, "shape": [1], "chunks": [1],
                     "dtype": [["a", "<f8", [4294967296, 4294967296]]], "compressor": null,
                     "fill_value": null, "order": "C", "filters": null}"#,
            ),
        )
        .await
        .unwrap();
    assert!(matches!(
        hierarchy.open_array("wide").await,
        Err(ZarrError::InvalidDType(_))
    ));

    assert!(matches!(
        DTypeDescriptor::parse(&json!("<f16")),
        Err(ZarrError::InvalidDType(_))
    ));
}

#[tokio::test]
async fn pipelines_round_trip_chunks() {
    let store = Arc::new(MemoryBackend::new());
    let hierarchy = Hierarchy::new(store);
    let raw: Vec<u8> = (0..64i32).flat_map(|i| (i * 1000 - 7).to_be_bytes()).collect();
    let configs: Vec<(Option<Vec<CodecSpec>>, Option<CodecSpec>)> = vec![
        (None, None),
        (Some(vec![]), Some(CodecSpec::new("gzip"))),
        (
            Some(vec![CodecSpec::new("delta").with_param("dtype", ">i4")]),
            Some(
                CodecSpec::new("blosc")
                    .with_param("cname", "zstd")
                    .with_param("clevel", 5)
                    .with_param("shuffle", 2),
            ),
        ),
        (
            Some(vec![
                CodecSpec::new("delta")
                    .with_param("dtype", ">i4")
                    .with_param("astype", "<i8"),
            ]),
            Some(CodecSpec::new("lz4")),
        ),
    ];
    for (i, (filters, compressor)) in configs.into_iter().enumerate() {
        let md = ArrayMetadata::new(vec![8, 8], vec![8, 8], dtype(">i4"))
            .with_filters(filters)
            .with_compressor(compressor);
        let array = hierarchy.create_array_at(&format!("p{i}"), md).await.unwrap();
        array.write_chunk(&[0, 0], &raw).await.unwrap();
        let reopened = hierarchy.open_array(&format!("p{i}")).await.unwrap();
        assert_eq!(reopened.read_chunk(&[0, 0]).await.unwrap(), raw, "config {i}");
    }
}

#[tokio::test]
async fn conflicting_kinds_are_rejected() {
    let store = Arc::new(MemoryBackend::new());
    let hierarchy = Hierarchy::new(store);
    hierarchy
        .create_array_at("data", ArrayMetadata::new(vec![3], vec![3], dtype("<u2")))
        .await
        .unwrap();
    assert!(matches!(
        hierarchy.create_array_at("data/inner", ArrayMetadata::new(vec![3], vec![3], dtype("<u2"))).await,
        Err(ZarrError::PathConflict { .. })
    ));
    assert!(matches!(
        hierarchy.create_array_at("a/../b", ArrayMetadata::new(vec![3], vec![3], dtype("<u2"))).await,
        Err(ZarrError::InvalidPath { .. })
    ));
}

#[tokio::test]
async fn missing_zarray_fields_surface_on_open() {
    let store = Arc::new(MemoryBackend::new());
    let hierarchy = Hierarchy::new(store.clone());
    store
        .put(
            "broken/.zarray",
            bytes::Bytes::from_static(
                br#"{"zarr_format": 2, "shape": [2], "chunks": [2], "dtype": "<i4",
                     "fill_value": 0, "order": "C", "filters": null}"#,
            ),
        )
        .await
        .unwrap();
    assert!(matches!(
        hierarchy.open_array("broken").await,
        Err(ZarrError::MissingField { field, .. }) if field == "compressor"
    ));
}

#[test]
fn path_normalization() {
    assert_eq!(path::key_prefix("/foo//bar/").unwrap(), "foo/bar/");
    assert!(matches!(
        path::normalize("foo/../bar"),
        Err(ZarrError::InvalidPath { .. })
    ));
}

#[test]
fn dtype_strings_round_trip() {
    for s in [
        "|b1", "<i1", ">i8", "<u4", "<f2", ">f8", "<c16", "<m8[ns]", ">M8[10s]", "|S12",
        "<U3", "|V7",
    ] {
        let parsed = DTypeDescriptor::parse(&json!(s)).unwrap();
        assert_eq!(parsed.to_json(), json!(s));
    }
    let nested = json!([["a", "<i4"], ["b", [["x", "<f8", [2, 3]], ["y", "|u1"]]]]);
    assert_eq!(DTypeDescriptor::parse(&nested).unwrap().to_json(), nested);
}
