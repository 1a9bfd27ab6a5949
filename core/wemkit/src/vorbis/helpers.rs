//! Integer helpers from the Vorbis I specification.

/// Number of bits needed to represent `v`.
///
/// Returns 0 for input 0, otherwise floor(log2(v)) + 1.
#[inline]
pub fn ilog(v: u32) -> u8 {
    (32 - v.leading_zeros()) as u8
}

/// Number of quantized values in a type 1 lookup table.
///
/// This is the largest `vals` with `vals^dimensions <= entries`.
pub fn book_map_type1_quantvals(entries: u32, dimensions: u32) -> u32 {
    if dimensions == 0 || entries == 0 {
        return 0;
    }

    let bits = ilog(entries) as u32;
    let mut vals = entries >> ((bits - 1) * (dimensions - 1) / dimensions);

    loop {
        let acc = saturating_pow(vals, dimensions);
        let acc1 = saturating_pow(vals + 1, dimensions);

        if acc <= entries as u64 && acc1 > entries as u64 {
            return vals;
        }

        if acc > entries as u64 {
            vals -= 1;
        } else {
            vals += 1;
        }
    }
}

fn saturating_pow(base: u32, exp: u32) -> u64 {
    (0..exp).fold(1u64, |acc, _| acc.saturating_mul(base as u64))
}
