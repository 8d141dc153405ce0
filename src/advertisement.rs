//! Service identifier extraction from raw advertising data.
//!
//! Platform-side filtering of 128-bit service identifiers is unreliable on some stacks,
//! so scanning filters on the identifiers decoded here instead.

use log::trace;
use uuid::Uuid;

use crate::btuuid::bluetooth_uuid_from_u16;

/// Advertising data (AD) type tags understood by [`parse_service_uuids`].
pub mod ad_type {
    /// Incomplete list of 16-bit service identifiers.
    pub const INCOMPLETE_16BIT_SERVICES: u8 = 0x02;
    /// Complete list of 16-bit service identifiers.
    pub const COMPLETE_16BIT_SERVICES: u8 = 0x03;
    /// Incomplete list of 128-bit service identifiers.
    pub const INCOMPLETE_128BIT_SERVICES: u8 = 0x06;
    /// Complete list of 128-bit service identifiers.
    pub const COMPLETE_128BIT_SERVICES: u8 = 0x07;
}

/// Decodes the service identifiers advertised in `data`, in encounter order.
///
/// `data` is a sequence of `[length, type, payload...]` records where `length` counts the
/// type byte and the payload. A zero length ends the data. Records of other types are
/// skipped. Malformed input never panics:
/// - a 16-bit list running past the end yields its complete entries and ends parsing;
/// - a 128-bit entry running past the end is skipped.
///
/// Duplicates are kept.
pub fn parse_service_uuids(data: &[u8]) -> Vec<Uuid> {
    let mut uuids = Vec::new();
    let mut offset = 0;
    while offset + 2 <= data.len() {
        let len = usize::from(data[offset]);
        if len == 0 {
            break;
        }
        let tag = data[offset + 1];
        let start = offset + 2;
        let end = offset + 1 + len;
        match tag {
            ad_type::INCOMPLETE_16BIT_SERVICES | ad_type::COMPLETE_16BIT_SERVICES => {
                let payload = data.get(start..end);
                let truncated = payload.is_none();
                let payload = payload.unwrap_or(&data[start..]);
                uuids.extend(
                    payload
                        .chunks_exact(2)
                        .map(|p| bluetooth_uuid_from_u16(u16::from_le_bytes([p[0], p[1]]))),
                );
                if truncated {
                    trace!("16-bit service list truncated at offset {offset}");
                    break;
                }
            }
            ad_type::INCOMPLETE_128BIT_SERVICES | ad_type::COMPLETE_128BIT_SERVICES => {
                let mut cursor = start;
                while cursor + 16 <= end {
                    match data
                        .get(cursor..cursor + 16)
                        .and_then(|raw| <[u8; 16]>::try_from(raw).ok())
                    {
                        Some(raw) => uuids.push(Uuid::from_u128(u128::from_le_bytes(raw))),
                        None => trace!("128-bit service entry truncated at offset {cursor}"),
                    }
                    cursor += 16;
                }
            }
            _ => (),
        }
        offset = end;
    }
    uuids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btuuid::nordic_uart;

    fn uuid128_record(tag: u8, uuids: &[Uuid]) -> Vec<u8> {
        let mut rec = vec![(1 + 16 * uuids.len()) as u8, tag];
        for uuid in uuids {
            rec.extend_from_slice(&uuid.as_u128().to_le_bytes());
        }
        rec
    }

    #[test]
    fn expands_16bit_identifiers() {
        let data = [0x02, 0x01, 0x06, 0x05, 0x03, 0x34, 0x12, 0x0f, 0x18];
        let uuids = parse_service_uuids(&data);
        assert_eq!(
            uuids,
            vec![bluetooth_uuid_from_u16(0x1234), bluetooth_uuid_from_u16(0x180f)]
        );
        assert_eq!(uuids[0].to_string(), "00001234-0000-1000-8000-00805f9b34fb");
    }

    #[test]
    fn reads_high_bytes_unsigned() {
        let data = [0x03, 0x02, 0xfe, 0xff];
        assert_eq!(parse_service_uuids(&data), vec![bluetooth_uuid_from_u16(0xfffe)]);
    }

    #[test]
    fn decodes_nordic_uart_service() {
        let data = uuid128_record(ad_type::COMPLETE_128BIT_SERVICES, &[nordic_uart::SERVICE]);
        assert_eq!(
            &data[2..],
            &[
                0x9e, 0xca, 0xdc, 0x24, 0x0e, 0xe5, 0xa9, 0xe0, 0x93, 0xf3, 0xa3, 0xb5, 0x01,
                0x00, 0x40, 0x6e
            ]
        );
        assert_eq!(parse_service_uuids(&data), vec![nordic_uart::SERVICE]);
    }

    #[test]
    fn keeps_encounter_order_and_duplicates() {
        let mut data = uuid128_record(
            ad_type::INCOMPLETE_128BIT_SERVICES,
            &[nordic_uart::TX, nordic_uart::RX],
        );
        data.extend_from_slice(&[0x03, 0x03, 0x0d, 0x18]);
        data.extend(uuid128_record(ad_type::COMPLETE_128BIT_SERVICES, &[nordic_uart::TX]));
        assert_eq!(
            parse_service_uuids(&data),
            vec![
                nordic_uart::TX,
                nordic_uart::RX,
                bluetooth_uuid_from_u16(0x180d),
                nordic_uart::TX
            ]
        );
    }

    #[test]
    fn skips_unknown_records() {
        // flags, shortened local name "Ad", then a 16-bit list
        let data = [0x02, 0x01, 0x06, 0x03, 0x08, b'A', b'd', 0x03, 0x02, 0x0a, 0x18];
        assert_eq!(parse_service_uuids(&data), vec![bluetooth_uuid_from_u16(0x180a)]);
    }

    #[test]
    fn zero_length_ends_parsing() {
        let data = [0x03, 0x03, 0x0a, 0x18, 0x00, 0x03, 0x03, 0x0d, 0x18];
        assert_eq!(parse_service_uuids(&data), vec![bluetooth_uuid_from_u16(0x180a)]);
    }

    #[test]
    fn truncated_16bit_list_keeps_complete_entries() {
        // claims three identifiers, only one and a half are present
        let data = [0x03, 0x03, 0x0a, 0x18, 0x07, 0x03, 0x0d, 0x18, 0x0f];
        assert_eq!(
            parse_service_uuids(&data),
            vec![bluetooth_uuid_from_u16(0x180a), bluetooth_uuid_from_u16(0x180d)]
        );
    }

    #[test]
    fn truncated_128bit_entry_is_skipped() {
        let mut data = uuid128_record(
            ad_type::COMPLETE_128BIT_SERVICES,
            &[nordic_uart::SERVICE, nordic_uart::TX],
        );
        data.truncate(data.len() - 3);
        assert_eq!(parse_service_uuids(&data), vec![nordic_uart::SERVICE]);
    }

    #[test]
    fn tolerates_degenerate_input() {
        assert!(parse_service_uuids(&[]).is_empty());
        assert!(parse_service_uuids(&[0x05]).is_empty());
        assert!(parse_service_uuids(&[0xff, 0x07, 0x01, 0x02]).is_empty());
        assert!(parse_service_uuids(&[0x01, 0x03]).is_empty());
    }
}
