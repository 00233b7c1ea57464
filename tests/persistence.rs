use std::fs;

use affinet::error::NetError;
use affinet::io::{TokenReader, TokenWriter};
use affinet::layers::AffineTransform;
use affinet::math::Matrix;
use affinet::optim::{TrainOptions, UpdateRule};
use affinet::weights::{load_affine, save_affine};

fn fixed_layer() -> AffineTransform {
    let mut layer = AffineTransform::new(3, 2);
    layer.set_linearity(&Matrix::from_vec(
        2,
        3,
        vec![0.5, -1.0, 2.0, 0.25, 0.0, -0.75],
    ));
    layer.set_bias(&[0.1, -0.2]);
    layer
}

fn write_to_vec(layer: &AffineTransform, binary: bool) -> Vec<u8> {
    let mut buf = Vec::new();
    if binary {
        let mut writer = TokenWriter::binary(&mut buf);
        layer.write_data(&mut writer).unwrap();
    } else {
        let mut writer = TokenWriter::text(&mut buf);
        layer.write_data(&mut writer).unwrap();
    }
    buf
}

#[test]
fn text_roundtrip_reproduces_parameters() {
    let layer = fixed_layer();
    let buf = write_to_vec(&layer, false);

    let mut restored = AffineTransform::new(3, 2);
    let mut reader = TokenReader::text(&buf[..]);
    restored.read_data(&mut reader).unwrap();

    assert_eq!(restored.linearity().data, layer.linearity().data);
    assert_eq!(restored.bias(), layer.bias());
    assert_eq!(restored.learn_rate_coef(), 1.0);
    assert_eq!(restored.max_grad(), 0.0);
    assert!(restored.ada_buffers().is_none());
}

#[test]
fn binary_roundtrip_includes_accumulators() {
    let mut layer = fixed_layer();
    let input = Matrix::from_vec(2, 3, vec![1.0, -2.0, 0.5, 0.3, 0.9, -1.1]);
    let grad = Matrix::from_vec(2, 2, vec![0.4, -0.3, 0.2, 0.1]);
    layer.update(&input, &grad, UpdateRule::AdaGrad, &TrainOptions::default());
    assert!(layer.ada_buffers().is_some());

    let buf = write_to_vec(&layer, true);

    let mut restored = AffineTransform::new(3, 2);
    let mut reader = TokenReader::binary(&buf[..]);
    restored.read_data(&mut reader).unwrap();

    assert_eq!(restored.linearity().data, layer.linearity().data);
    assert_eq!(restored.bias(), layer.bias());
    let ada = layer.ada_buffers().unwrap();
    let restored_ada = restored.ada_buffers().unwrap();
    assert_eq!(restored_ada.linearity_accu.data, ada.linearity_accu.data);
    assert_eq!(restored_ada.bias_accu, ada.bias_accu);
}

#[test]
fn text_and_binary_roundtrips_agree() {
    let layer = fixed_layer();

    let text = write_to_vec(&layer, false);
    let mut from_text = AffineTransform::new(3, 2);
    from_text
        .read_data(&mut TokenReader::text(&text[..]))
        .unwrap();

    let bin = write_to_vec(&layer, true);
    let mut from_bin = AffineTransform::new(3, 2);
    from_bin
        .read_data(&mut TokenReader::binary(&bin[..]))
        .unwrap();

    assert_eq!(from_text.linearity().data, from_bin.linearity().data);
    assert_eq!(from_text.bias(), from_bin.bias());
}

#[test]
fn reading_without_accumulator_block_resets_stale_state() {
    let mut layer = fixed_layer();
    let input = Matrix::from_vec(1, 3, vec![1.0, 1.0, 1.0]);
    let grad = Matrix::from_vec(1, 2, vec![0.5, 0.5]);
    layer.update(&input, &grad, UpdateRule::RmsProp, &TrainOptions::default());
    assert!(layer.ada_buffers().is_some());

    let plain = fixed_layer();
    let buf = write_to_vec(&plain, false);
    layer.read_data(&mut TokenReader::text(&buf[..])).unwrap();
    assert!(layer.ada_buffers().is_none());
}

#[test]
fn absent_optional_tags_keep_defaults() {
    // stream with the mandatory tensors only
    let mut buf = Vec::new();
    {
        let mut writer = TokenWriter::text(&mut buf);
        writer
            .write_matrix(&Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]))
            .unwrap();
        writer.write_vector(&[7.0, 8.0]).unwrap();
    }

    let mut layer = AffineTransform::new(3, 2);
    layer.read_data(&mut TokenReader::text(&buf[..])).unwrap();
    assert_eq!(layer.learn_rate_coef(), 1.0);
    assert_eq!(layer.max_grad(), 0.0);
    assert_eq!(layer.bias(), &[7.0, 8.0]);
}

#[test]
fn prefix_subset_of_optional_tags_is_accepted() {
    let mut buf = Vec::new();
    {
        let mut writer = TokenWriter::text(&mut buf);
        writer.write_token("<MaxGrad>").unwrap();
        writer.write_f32(0.25).unwrap();
        writer
            .write_matrix(&Matrix::from_vec(2, 3, vec![0.0; 6]))
            .unwrap();
        writer.write_vector(&[0.0, 0.0]).unwrap();
    }

    let mut layer = AffineTransform::new(3, 2);
    layer.read_data(&mut TokenReader::text(&buf[..])).unwrap();
    assert_eq!(layer.max_grad(), 0.25);
    assert_eq!(layer.learn_rate_coef(), 1.0);
}

#[test]
fn dimension_mismatch_is_corrupt_state() {
    let small = fixed_layer();
    let buf = write_to_vec(&small, false);

    let mut wrong = AffineTransform::new(4, 2);
    let err = wrong
        .read_data(&mut TokenReader::text(&buf[..]))
        .unwrap_err();
    assert!(matches!(err, NetError::CorruptState(_)));
}

#[test]
fn accumulator_dimension_mismatch_is_corrupt_state() {
    let mut buf = Vec::new();
    {
        let mut writer = TokenWriter::text(&mut buf);
        writer.write_token("<AffineAccus>").unwrap();
        writer.write_matrix(&Matrix::zeros(1, 1)).unwrap();
        writer.write_vector(&[0.0]).unwrap();
        writer.write_matrix(&Matrix::zeros(2, 3)).unwrap();
        writer.write_vector(&[0.0, 0.0]).unwrap();
    }

    let mut layer = AffineTransform::new(3, 2);
    let err = layer
        .read_data(&mut TokenReader::text(&buf[..]))
        .unwrap_err();
    assert!(matches!(err, NetError::CorruptState(_)));
}

#[test]
fn init_data_applies_options_and_defaults() {
    let mut layer = AffineTransform::new(8, 4);
    let mut reader = TokenReader::text("<LearnRateCoef> 0.5".as_bytes());
    layer.init_data(&mut reader).unwrap();

    assert_eq!(layer.learn_rate_coef(), 0.5);
    assert_eq!(layer.max_grad(), 0.0);
    // default ParamRange is 0.02
    for &v in &layer.linearity().data {
        assert!((-0.02..=0.02).contains(&v));
    }
    for &v in layer.bias() {
        assert!((-0.02..=0.02).contains(&v));
    }
}

#[test]
fn init_data_reads_several_options() {
    let mut layer = AffineTransform::new(4, 4);
    let config = "<ParamRange> 0.1 <LearnRateCoef> 2.0 <MaxGrad> 1.5";
    layer.init_data(&mut TokenReader::text(config.as_bytes())).unwrap();

    assert_eq!(layer.learn_rate_coef(), 2.0);
    assert_eq!(layer.max_grad(), 1.5);
    for &v in &layer.linearity().data {
        assert!((-0.1..=0.1).contains(&v));
    }
}

#[test]
fn init_data_rejects_unknown_option() {
    let mut layer = AffineTransform::new(4, 4);
    let mut reader = TokenReader::text("<ParamStddev> 0.1".as_bytes());
    let err = layer.init_data(&mut reader).unwrap_err();
    assert!(matches!(err, NetError::Config(token) if token == "<ParamStddev>"));
}

#[test]
fn json_checkpoint_roundtrip() {
    let layer = fixed_layer();
    let path = "test_affine_checkpoint.json";
    save_affine(path, &layer).expect("failed to save affine checkpoint");

    let mut restored = AffineTransform::new(3, 2);
    load_affine(path, &mut restored).expect("failed to load affine checkpoint");
    fs::remove_file(path).ok();

    assert_eq!(restored.linearity().data, layer.linearity().data);
    assert_eq!(restored.bias(), layer.bias());
}

#[test]
fn json_checkpoint_rejects_wrong_dims() {
    let layer = fixed_layer();
    let path = "test_affine_checkpoint_wrong.json";
    save_affine(path, &layer).unwrap();

    let mut wrong = AffineTransform::new(5, 2);
    let err = load_affine(path, &mut wrong).unwrap_err();
    fs::remove_file(path).ok();
    assert!(matches!(err, NetError::CorruptState(_)));
}
