// ABOUTME: Packing of 7-bit septets into octets and back, with optional leading fill bits
// ABOUTME: Used for GSM-7 user data and alphanumeric address values

/// Packs septets (one per input byte, high bit ignored) into octets.
///
/// `fill_bits` zero bits are inserted before the first septet so that text
/// following a user data header starts on a septet boundary. The final
/// partial octet is zero padded.
pub fn pack_septets(septets: &[u8], fill_bits: u8) -> Vec<u8> {
    let total_bits = septets.len() * 7 + fill_bits as usize;
    let mut packed = Vec::with_capacity(total_bits.div_ceil(8));
    let mut acc: u32 = 0;
    let mut bits = fill_bits as u32;

    for &septet in septets {
        acc |= ((septet & 0x7F) as u32) << bits;
        bits += 7;
        while bits >= 8 {
            packed.push(acc as u8);
            acc >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        packed.push(acc as u8);
    }
    packed
}

/// Unpacks octets into septets, skipping `fill_bits` leading bits.
///
/// With `max_septets` set, unpacking stops after that many septets. Without a
/// count, a final all-zero septet made up purely of padding (the 7 spare bits
/// left when 7 septets fill 7 octets) is dropped, as it would otherwise read
/// as a spurious `@`.
pub fn unpack_septets(data: &[u8], max_septets: Option<usize>, fill_bits: u8) -> Vec<u8> {
    let usable_bits = (data.len() * 8).saturating_sub(fill_bits as usize);
    let mut septets = Vec::with_capacity(usable_bits / 7);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut skip = fill_bits as u32;

    for &octet in data {
        acc |= (octet as u32) << bits;
        bits += 8;
        if skip > 0 {
            let dropped = skip.min(bits);
            acc >>= dropped;
            bits -= dropped;
            skip -= dropped;
        }
        while bits >= 7 {
            if max_septets.is_some_and(|max| septets.len() >= max) {
                return septets;
            }
            septets.push((acc & 0x7F) as u8);
            acc >>= 7;
            bits -= 7;
        }
    }

    match max_septets {
        Some(max) => septets.truncate(max),
        None => {
            if usable_bits % 7 == 0 && septets.last() == Some(&0) {
                septets.pop();
            }
        }
    }
    septets
}
