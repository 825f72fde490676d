/// Canonical CPU quantity: whole cores when exact, millicores otherwise.
pub fn format_millicores(millis: u64) -> String {
    if millis % 1000 == 0 {
        format!("{}", millis / 1000)
    } else {
        format!("{}m", millis)
    }
}

/// Canonical memory quantity in the largest binary unit that divides it exactly.
pub fn format_bytes(b: u64) -> String {
    if b == 0 {
        return "0".to_string();
    }
    const UNIT: u64 = 1024;
    let suffixes = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
    let mut n = b;
    let mut exp = 0;
    while n % UNIT == 0 && exp < suffixes.len() {
        n /= UNIT;
        exp += 1;
    }
    if exp == 0 {
        format!("{}", b)
    } else {
        format!("{}{}", n, suffixes[exp - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millicores() {
        assert_eq!(format_millicores(0), "0");
        assert_eq!(format_millicores(500), "500m");
        assert_eq!(format_millicores(2000), "2");
        assert_eq!(format_millicores(1500), "1500m");
    }

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(0), "0");
        assert_eq!(format_bytes(1000), "1000");
        assert_eq!(format_bytes(134_217_728), "128Mi");
        assert_eq!(format_bytes(1536 * 1024), "1536Ki");
        assert_eq!(format_bytes(4 * 1024 * 1024 * 1024), "4Gi");
    }
}
