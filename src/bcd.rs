// Packed BCD helpers for the RTC drivers (DS1302, DS1307).

pub const fn to_decimal(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0F)
}

pub const fn from_decimal(dec: u8) -> u8 {
    ((dec / 10) << 4) | (dec % 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bcd_values() {
        assert_eq!(from_decimal(59), 0x59);
        assert_eq!(from_decimal(7), 0x07);
        assert_eq!(to_decimal(0x23), 23);
        assert_eq!(to_decimal(0x99), 99);
    }
}
