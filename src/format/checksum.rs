//! The Jenkins lookup3 checksum of version 2 metadata structures.

use super::FormatError;

fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(4);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(6);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(8);
    *b = b.wrapping_add(*a);
    *a = a.wrapping_sub(*c);
    *a ^= c.rotate_left(16);
    *c = c.wrapping_add(*b);
    *b = b.wrapping_sub(*a);
    *b ^= a.rotate_left(19);
    *a = a.wrapping_add(*c);
    *c = c.wrapping_sub(*b);
    *c ^= b.rotate_left(4);
    *b = b.wrapping_add(*a);
}

fn final_mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

fn word(block: &[u8], index: usize) -> u32 {
    u32::from_le_bytes([
        block[index * 4],
        block[index * 4 + 1],
        block[index * 4 + 2],
        block[index * 4 + 3],
    ])
}

/// Compute the Jenkins lookup3 `hashlittle` checksum of `data` with an initial value of zero.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn lookup3(data: &[u8]) -> u32 {
    let mut a = 0xdead_beef_u32.wrapping_add(data.len() as u32);
    let mut b = a;
    let mut c = a;

    let mut rest = data;
    while rest.len() > 12 {
        a = a.wrapping_add(word(rest, 0));
        b = b.wrapping_add(word(rest, 1));
        c = c.wrapping_add(word(rest, 2));
        mix(&mut a, &mut b, &mut c);
        rest = &rest[12..];
    }
    if rest.is_empty() {
        return c;
    }

    // The final 1 to 12 bytes are zero padded.
    let mut tail = [0u8; 12];
    tail[..rest.len()].copy_from_slice(rest);
    a = a.wrapping_add(word(&tail, 0));
    b = b.wrapping_add(word(&tail, 1));
    c = c.wrapping_add(word(&tail, 2));
    final_mix(&mut a, &mut b, &mut c);
    c
}

/// Verify that the last four bytes of `data` hold the lookup3 checksum of the preceding bytes.
pub(crate) fn verify_trailing(data: &[u8], structure: &'static str) -> Result<(), FormatError> {
    let Some(split) = data.len().checked_sub(4) else {
        return Err(FormatError::Truncated {
            structure,
            position: 0,
            needed: 4,
            available: data.len(),
        });
    };
    let (body, stored) = data.split_at(split);
    let stored = u32::from_le_bytes([stored[0], stored[1], stored[2], stored[3]]);
    let computed = lookup3(body);
    if stored == computed {
        Ok(())
    } else {
        Err(FormatError::ChecksumMismatch {
            structure,
            stored,
            computed,
        })
    }
}
