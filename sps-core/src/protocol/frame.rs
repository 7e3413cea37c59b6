use super::{DEVICE_ADDRESS, ESCAPE, FRAME_DELIMITER};

// escaped byte -> second byte of its escape sequence
const ESCAPES: [(u8, u8); 4] = [(0x7E, 0x5E), (0x7D, 0x5D), (0x11, 0x31), (0x13, 0x33)];

/// Reverses the link-layer byte-stuffing of a raw frame.
///
/// Only the four escape sequences of the protocol are replaced, in a single
/// left-to-right pass. Any other byte, including an `0x7D` that does not
/// start a known sequence, is copied unchanged.
pub fn destuff(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let byte = raw[i];
        if byte == ESCAPE {
            if let Some(&next) = raw.get(i + 1) {
                if let Some(&(original, _)) = ESCAPES.iter().find(|(_, code)| *code == next) {
                    out.push(original);
                    i += 2;
                    continue;
                }
            }
        }
        out.push(byte);
        i += 1;
    }

    out
}

/// Applies byte-stuffing to a frame interior (everything between the
/// delimiters).
pub fn stuff(interior: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(interior.len() + 4);

    for &byte in interior {
        match ESCAPES.iter().find(|(original, _)| *original == byte) {
            Some(&(_, code)) => {
                out.push(ESCAPE);
                out.push(code);
            }
            None => out.push(byte),
        }
    }

    out
}

/// Frame checksum: the inverted low byte of the sum of all interior bytes.
pub fn checksum(interior: &[u8]) -> u8 {
    let sum = interior.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    !sum
}

/// Builds a complete, stuffed response frame as the sensor would send it.
pub fn encode_response(command: u8, state: u8, data: &[u8]) -> Vec<u8> {
    let mut interior = Vec::with_capacity(data.len() + 5);
    interior.push(DEVICE_ADDRESS);
    interior.push(command);
    interior.push(state);
    interior.push(data.len() as u8);
    interior.extend_from_slice(data);
    interior.push(checksum(&interior));

    let mut frame = Vec::with_capacity(interior.len() + 8);
    frame.push(FRAME_DELIMITER);
    frame.extend(stuff(&interior));
    frame.push(FRAME_DELIMITER);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destuff_replaces_each_escape_sequence() {
        assert_eq!(destuff(&[0x7D, 0x5E]), vec![0x7E]);
        assert_eq!(destuff(&[0x7D, 0x5D]), vec![0x7D]);
        assert_eq!(destuff(&[0x7D, 0x31]), vec![0x11]);
        assert_eq!(destuff(&[0x7D, 0x33]), vec![0x13]);
        assert_eq!(
            destuff(&[0x7E, 0x01, 0x7D, 0x5E, 0x02, 0x7D, 0x33, 0x7E]),
            vec![0x7E, 0x01, 0x7E, 0x02, 0x13, 0x7E]
        );
    }

    #[test]
    fn destuff_leaves_unknown_sequences_alone() {
        assert_eq!(destuff(&[0x7D, 0x00, 0x7D]), vec![0x7D, 0x00, 0x7D]);
        assert_eq!(destuff(&[0x7D, 0x7D, 0x5E]), vec![0x7D, 0x7E]);
        assert_eq!(destuff(&[0x7D, 0x5D, 0x5E]), vec![0x7D, 0x5E]);
    }

    #[test]
    fn destuff_is_idempotent_on_clean_input() {
        let clean = [0x7E, 0x00, 0x03, 0x00, 0x28, 0x41, 0x20, 0x00, 0x00, 0xFC, 0x7E];
        let once = destuff(&clean);
        assert_eq!(once, clean.to_vec());
        assert_eq!(destuff(&once), once);
    }

    #[test]
    fn encoded_frames_have_no_interior_delimiters() {
        let data = [0x7E, 0x7D, 0x11, 0x13, 0x42];
        let frame = encode_response(0x03, 0x00, &data);

        assert_eq!(frame[0], FRAME_DELIMITER);
        assert_eq!(frame[frame.len() - 1], FRAME_DELIMITER);
        assert!(!frame[1..frame.len() - 1].contains(&FRAME_DELIMITER));

        let plain = destuff(&frame);
        assert_eq!(&plain[5..10], &data);
        assert_eq!(plain[plain.len() - 2], checksum(&plain[1..plain.len() - 2]));
    }
}
