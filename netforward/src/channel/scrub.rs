//! Post-processing for output collected across pager pauses.
//!
//! Pagers leave three kinds of debris in the stream: the banner itself, the
//! CR/space/CR sequence some devices use to blank it out, and runs of
//! backspace or NUL used to erase it in place. [`scrub`] removes all three
//! without touching ordinary output.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::bytes::Regex;

/// Line redrawn in place: `\r\n<text>\r<spaces>\r`.
static REDRAW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?-u)\r\n[^\n]*?\r +\r").unwrap());

/// Backspace/NUL erase run with the blanking spaces it wrote.
static ERASE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u)[\x00\x08]+ +[\x00\x08]*").unwrap());

static CONTROL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?-u)[\x00\x08]").unwrap());

/// Clean `data`, removing every banner literal in `banners`.
pub fn scrub(data: &[u8], banners: &[Vec<u8>]) -> Vec<u8> {
    let mut out: Cow<'_, [u8]> = Cow::Borrowed(data);

    out = own(REDRAW.replace_all(&out, &b"\r\n"[..]));

    for banner in unique(banners) {
        let Some(pattern) = banner_pattern(banner) else {
            continue;
        };
        out = own(pattern.replace_all(&out, &b""[..]));
    }

    out = own(ERASE_RUN.replace_all(&out, &b""[..]));
    out = own(CONTROL.replace_all(&out, &b""[..]));

    out.into_owned()
}

fn own(replaced: Cow<'_, [u8]>) -> Cow<'static, [u8]> {
    Cow::Owned(replaced.into_owned())
}

fn unique(banners: &[Vec<u8>]) -> Vec<&[u8]> {
    let mut seen: Vec<&[u8]> = Vec::new();
    for banner in banners {
        if !banner.is_empty() && !seen.contains(&banner.as_slice()) {
            seen.push(banner);
        }
    }
    seen
}

fn banner_pattern(banner: &[u8]) -> Option<Regex> {
    let literal = String::from_utf8_lossy(banner);
    let source = format!(
        r"(?-u) *{} *(\r +\r|[\x00\x08]+ +[\x00\x08]*)?",
        regex::escape(&literal)
    );
    Regex::new(&source).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_untouched() {
        let text = b"interface Gi0/1\r\n description uplink\r\n ip address 10.0.0.1 255.255.255.0\r\n";
        assert_eq!(scrub(text, &[]), text.to_vec());
    }

    #[test]
    fn test_crlf_blank_lines_untouched() {
        let text = b"a\r\n\r\nb\r\r\nc";
        assert_eq!(scrub(text, &[b"--More--".to_vec()]), text.to_vec());
    }

    #[test]
    fn test_redraw_collapse() {
        let text = b"line 1\r\n --More-- \r          \rline 2\r\n";
        assert_eq!(scrub(text, &[]), b"line 1\r\nline 2\r\n".to_vec());
    }

    #[test]
    fn test_banner_with_backspace_erase() {
        let mut text = b"line 1\r\n ---- More ----".to_vec();
        text.extend(std::iter::repeat_n(0x08, 14));
        text.extend(std::iter::repeat_n(b' ', 14));
        text.extend(std::iter::repeat_n(0x08, 14));
        text.extend_from_slice(b"line 2\r\n");

        let cleaned = scrub(&text, &[b"---- More ----".to_vec()]);
        assert_eq!(cleaned, b"line 1\r\nline 2\r\n".to_vec());
    }

    #[test]
    fn test_banner_on_its_own() {
        let text = b"page one\r\n<--- More --->\r        \rpage two";
        let cleaned = scrub(text, &[b"<--- More --->".to_vec()]);
        assert_eq!(cleaned, b"page one\r\npage two".to_vec());
    }

    #[test]
    fn test_nul_erase_after_break_banner() {
        let text = b"a\r\n --More(CTRL+C break)-- \x00\x08\x08   \x08\x08b";
        let cleaned = scrub(text, &[b"--More(CTRL+C break)--".to_vec()]);
        assert_eq!(cleaned, b"a\r\nb".to_vec());
    }

    #[test]
    fn test_stray_controls_removed() {
        assert_eq!(scrub(b"ab\x08c\x00", &[]), b"abc".to_vec());
    }

    #[test]
    fn test_idempotent() {
        let text = b"x\r\n--More--\r    \ry\r\n";
        let banners = [b"--More--".to_vec()];
        let once = scrub(text, &banners);
        assert_eq!(scrub(&once, &banners), once);
    }
}
