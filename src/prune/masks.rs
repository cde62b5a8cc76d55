use crate::error::{PruneError, Result};
use crate::layers::LayerMask;
use crate::prune::pruned_set::PrunedSet;
use crate::prune::topology::{LayerDescriptor, LayerKind};

/// Builds a layer's mask from scratch.
///
/// `outputs` zeroes whole output units (weight rows, and bias entries for
/// linear layers); `inputs` is the upstream layer's pruned set and zeroes
/// the matching input channels in every row. Conv biases are left unmasked:
/// a pruned filter's constant output is cut off downstream by the input mask.
pub fn build_mask(
    desc: &LayerDescriptor,
    weight_shape: &[usize],
    outputs: Option<&PrunedSet>,
    inputs: Option<&PrunedSet>,
) -> Result<LayerMask> {
    let (out, inp) = match weight_shape {
        [o, i, ..] => (*o, *i),
        _ => {
            return Err(PruneError::ShapeMismatch {
                what: format!("{} weight", desc.id),
                expected: vec![desc.output_width, desc.input_width],
                got: weight_shape.to_vec(),
            })
        }
    };
    if out != desc.output_width || inp != desc.input_width {
        return Err(PruneError::ShapeMismatch {
            what: format!("{} weight", desc.id),
            expected: vec![desc.output_width, desc.input_width],
            got: weight_shape.to_vec(),
        });
    }

    let bias_len = match desc.kind {
        LayerKind::Conv => None,
        LayerKind::Linear => Some(out),
    };
    let mut mask = LayerMask::keep_all(weight_shape, bias_len);
    let inner: usize = weight_shape[2..].iter().product();
    let row_len = inp * inner;
    let block = inner * desc.input_span;

    if let Some(set) = outputs {
        check_width(desc, "output", set, out)?;
        let w = mask.weight.data_mut();
        for unit in set.iter() {
            w[unit * row_len..(unit + 1) * row_len].fill(0.0);
        }
        if let Some(b) = mask.bias.as_mut() {
            let b = b.data_mut();
            for unit in set.iter() {
                b[unit] = 0.0;
            }
        }
    }

    if let Some(set) = inputs {
        check_width(desc, "input", set, inp / desc.input_span.max(1))?;
        let w = mask.weight.data_mut();
        for row in w.chunks_mut(row_len) {
            for ch in set.iter() {
                row[ch * block..(ch + 1) * block].fill(0.0);
            }
        }
    }

    Ok(mask)
}

fn check_width(desc: &LayerDescriptor, side: &str, set: &PrunedSet, width: usize) -> Result<()> {
    if set.width() != width {
        return Err(PruneError::ShapeMismatch {
            what: format!("{} {side} pruned set ({})", desc.id, set.layer()),
            expected: vec![width],
            got: vec![set.width()],
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv_desc(out: usize, inp: usize) -> LayerDescriptor {
        LayerDescriptor {
            id: "conv".to_string(),
            kind: LayerKind::Conv,
            output_width: out,
            input_width: inp,
            predecessor: None,
            input_span: 1,
        }
    }

    fn set_of(width: usize, idx: &[usize]) -> PrunedSet {
        let mut s = PrunedSet::new("up", width);
        for i in idx {
            s.insert(*i).unwrap();
        }
        s
    }

    #[test]
    fn conv_mask_zeroes_rows_and_input_channels() {
        let desc = conv_desc(4, 3);
        let mask = build_mask(&desc, &[4, 3, 3, 3], Some(&set_of(4, &[2])), Some(&set_of(3, &[0]))).unwrap();
        assert_eq!(mask.weight.shape(), &[4, 3, 3, 3]);
        assert!(mask.bias.is_none());
        let w = mask.weight.data();
        for o in 0..4 {
            for i in 0..3 {
                let cell = &w[(o * 3 + i) * 9..(o * 3 + i + 1) * 9];
                let expect = if o == 2 || i == 0 { 0.0 } else { 1.0 };
                assert!(cell.iter().all(|v| *v == expect), "o={o} i={i}");
            }
        }
    }

    #[test]
    fn linear_mask_respects_input_span_and_bias() {
        let desc = LayerDescriptor {
            id: "fc0".to_string(),
            kind: LayerKind::Linear,
            output_width: 2,
            input_width: 6,
            predecessor: Some("conv".to_string()),
            input_span: 2,
        };
        let mask = build_mask(&desc, &[2, 6], Some(&set_of(2, &[1])), Some(&set_of(3, &[1]))).unwrap();
        assert_eq!(mask.weight.data(), &[1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(mask.bias.unwrap().data(), &[1.0, 0.0]);
    }

    #[test]
    fn mismatched_set_width_is_rejected() {
        let desc = conv_desc(4, 3);
        let err = build_mask(&desc, &[4, 3, 3, 3], None, Some(&set_of(5, &[]))).unwrap_err();
        assert!(matches!(err, PruneError::ShapeMismatch { .. }));
        assert!(build_mask(&desc, &[4, 2, 3, 3], None, None).is_err());
    }

    #[test]
    fn rebuilding_is_idempotent() {
        let desc = conv_desc(4, 3);
        let own = set_of(4, &[0, 3]);
        let up = set_of(3, &[2]);
        let a = build_mask(&desc, &[4, 3, 3, 3], Some(&own), Some(&up)).unwrap();
        let b = build_mask(&desc, &[4, 3, 3, 3], Some(&own), Some(&up)).unwrap();
        assert_eq!(a, b);
    }
}
