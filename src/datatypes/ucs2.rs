// ABOUTME: UCS-2 user data (big-endian 16-bit code units)
// ABOUTME: Characters outside the BMP are carried as surrogate pairs

/// Encodes text as big-endian 16-bit code units
pub fn encode_ucs2(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_be_bytes).collect()
}

/// Number of 16-bit code units `text` needs
pub fn ucs2_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Decodes big-endian 16-bit code units. A trailing odd octet is ignored and
/// unpaired surrogates become U+FFFD.
pub fn decode_ucs2(data: &[u8]) -> String {
    let units = data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
