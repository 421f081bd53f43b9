//! Integration tests for message decoding, delivery, and attachment export.

use std::path::{Path, PathBuf};

use assert_fs::prelude::*;
use predicates::prelude::*;

use inmail::config::DecoderConfig;
use inmail::delivery::accept_data;
use inmail::export::attachment::export_attachments;
use inmail::model::mail::Message;
use inmail::{decode, decode_file, decode_with, DecodeError};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn decode_fixture(name: &str) -> Message {
    decode_file(fixture(name), &DecoderConfig::default()).unwrap()
}

fn header_field(err: DecodeError) -> String {
    match err {
        DecodeError::HeaderSyntax { field, .. } => field,
        other => panic!("expected HeaderSyntax, got {other:?}"),
    }
}

/// Nest `levels` multipart/related bodies around a single text part.
fn nested_message(levels: usize) -> String {
    let mut part = "Content-Type: text/plain\r\n\r\ndeep".to_string();
    for i in (0..levels).rev() {
        part = format!(
            "Content-Type: multipart/related; boundary=\"b{i}\"\r\n\r\n--b{i}\r\n{part}\r\n--b{i}--"
        );
    }
    format!("Subject: nesting\r\n{part}\r\n")
}

// ─── Single-part messages ───────────────────────────────────────────

#[test]
fn test_plain_crlf_body_loses_one_newline() {
    let msg = decode(b"Subject: hi\r\n\r\nhello\r\n").unwrap();
    assert_eq!(msg.text_body, "hello");
    assert_eq!(msg.original_charset, "");
    assert!(msg.attachments.is_empty());
}

#[test]
fn test_undeclared_charset_leaves_text_untouched() {
    let raw = "Subject: plain\r\n\r\nNothing but ASCII here.\r\n".as_bytes();
    assert_eq!(decode(raw).unwrap().text_body, "Nothing but ASCII here.");

    let config = DecoderConfig {
        detect_charset: false,
        ..DecoderConfig::default()
    };
    let raw = "Subject: plain\r\n\r\nDéjà vu\r\n".as_bytes();
    assert_eq!(decode_with(raw, &config).unwrap().text_body, "Déjà vu");
}

#[test]
fn test_subject_charset_drives_body_conversion() {
    let msg = decode_fixture("latin1.eml");
    assert_eq!(msg.subject, "Réunion de lundi");
    assert_eq!(msg.text_body, "La réunion est déplacée à 10h.");
    assert_eq!(msg.original_charset, "iso-8859-1");
    assert_eq!(msg.from[0].name.as_deref(), Some("François"));
    assert_eq!(msg.date.unwrap().offset().local_minus_utc(), 3600);
}

#[test]
fn test_gb_charset_aliases_decode_identically() {
    let mut bodies = Vec::new();
    for charset in ["gb2312", "gb18030", "gb-18030"] {
        let mut raw = format!("Content-Type: text/plain; charset={charset}\r\n\r\n").into_bytes();
        raw.extend_from_slice(&[0xD6, 0xD0, 0xCE, 0xC4]);
        let msg = decode(&raw).unwrap();
        assert_eq!(msg.original_charset, charset);
        bodies.push(msg.text_body);
    }
    assert_eq!(bodies, ["中文", "中文", "中文"]);
}

#[test]
fn test_mbox_envelope_line_is_skipped() {
    let msg = decode_fixture("mbox_envelope.eml");
    assert_eq!(msg.subject, "archived");
    assert_eq!(msg.from[0].mailbox, "sender@example.com");
    assert_eq!(msg.text_body, "Pulled out of an mbox.");
}

// ─── Multipart messages ─────────────────────────────────────────────

#[test]
fn test_mixed_with_attachment() {
    let raw = b"From: a@example.com\r\n\
Content-Type: multipart/mixed; boundary=XYZ\r\n\
\r\n\
--XYZ\r\n\
Content-Type: text/plain\r\n\
\r\n\
see attached\r\n\
--XYZ\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=\"a.txt\"\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
aGVsbG8gd29ybGQ=\r\n\
--XYZ--\r\n";
    let msg = decode(raw).unwrap();
    assert_eq!(msg.text_body, "see attached");
    assert_eq!(msg.attachments.len(), 1);
    assert_eq!(msg.attachments[0].filename, "a.txt");
    assert_eq!(msg.attachments[0].content_type, "application/octet-stream");
    assert_eq!(msg.attachments[0].data, b"hello world");
    assert!(msg.embedded_files.is_empty());
}

#[test]
fn test_alternative_fills_both_bodies() {
    let raw = b"Content-Type: multipart/alternative; boundary=\"alt\"\r\n\
\r\n\
--alt\r\n\
Content-Type: text/plain; charset=us-ascii\r\n\
\r\n\
Plain version\r\n\
--alt\r\n\
Content-Type: text/html; charset=us-ascii\r\n\
\r\n\
<p>HTML version</p>\r\n\
--alt--\r\n";
    let msg = decode(raw).unwrap();
    assert_eq!(msg.text_body, "Plain version");
    assert_eq!(msg.html_body, "<p>HTML version</p>");
    assert_eq!(msg.content_type, "multipart/alternative; boundary=\"alt\"");
}

#[test]
fn test_newsletter_fixture() {
    let msg = decode_fixture("newsletter.eml");

    assert_eq!(msg.subject, "Café news for May");
    assert_eq!(msg.from[0].name.as_deref(), Some("José García"));
    assert_eq!(msg.to.len(), 2);
    assert_eq!(msg.to[0].name.as_deref(), Some("Doe, Jane"));
    assert_eq!(msg.cc.len(), 2);
    assert_eq!(msg.message_id, "news-42@example.com");
    assert_eq!(msg.references, ["a@example.com", "b@example.com"]);
    assert_eq!(msg.date.unwrap().offset().local_minus_utc(), 7200);

    assert!(msg.text_body.starts_with("Café opens at nine."));
    assert!(msg.text_body.ends_with("See the menu attached."));
    assert!(msg.html_body.starts_with("<html><body><img src=\"cid:logo@example.com\">"));
    assert!(msg.html_body.ends_with("</html>"));

    assert_eq!(msg.embedded_files.len(), 1);
    let logo = msg.embedded_by_cid("cid:logo@example.com").unwrap();
    assert_eq!(logo.media_type(), "image/png");
    assert_eq!(&logo.data[..4], b"\x89PNG");

    assert_eq!(msg.attachments.len(), 1);
    assert_eq!(msg.attachments[0].filename, "menu.pdf");
    assert_eq!(msg.attachments[0].content_type, "application/pdf");
    assert!(msg.attachments[0].data.starts_with(b"%PDF-1.4\n"));
    assert_eq!(msg.attachments[0].data.len(), 57);
    assert_eq!(msg.original_charset, "");
}

#[test]
fn test_base64_part_is_exact() {
    let raw = b"Content-Type: multipart/mixed; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=blob.bin\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
AAEC/f7/\r\n\
gA==\r\n\
--b--\r\n";
    let msg = decode(raw).unwrap();
    assert_eq!(msg.attachments[0].data, [0x00, 0x01, 0x02, 0xFD, 0xFE, 0xFF, 0x80]);
}

#[test]
fn test_unknown_transfer_encoding_fails_whole_decode() {
    let raw = b"Content-Type: multipart/alternative; boundary=b\r\n\
\r\n\
--b\r\n\
Content-Type: text/plain\r\n\
\r\n\
fine\r\n\
--b\r\n\
Content-Type: text/html\r\n\
Content-Transfer-Encoding: quoted-nonsense\r\n\
\r\n\
<p>never seen</p>\r\n\
--b--\r\n";
    match decode(raw).unwrap_err() {
        DecodeError::UnknownTransferEncoding(token) => assert_eq!(token, "quoted-nonsense"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_related_image_becomes_embedded_file() {
    let raw = b"Content-Type: multipart/mixed; boundary=m\r\n\
\r\n\
--m\r\n\
Content-Type: multipart/related; boundary=r\r\n\
\r\n\
--r\r\n\
Content-Type: text/html\r\n\
\r\n\
<img src=\"cid:part1.abc@host\">\r\n\
--r\r\n\
Content-Type: image/gif\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-Id: <part1.abc@host>\r\n\
\r\n\
R0lGODlh\r\n\
--r--\r\n\
--m--\r\n";
    let msg = decode(raw).unwrap();
    assert_eq!(msg.html_body, "<img src=\"cid:part1.abc@host\">");
    assert_eq!(msg.embedded_files.len(), 1);
    assert_eq!(msg.embedded_files[0].cid, "part1.abc@host");
    assert_eq!(msg.embedded_files[0].data, b"GIF89a");
    assert!(msg.attachments.is_empty());
}

#[test]
fn test_files_keep_depth_first_order() {
    let raw = b"Content-Type: multipart/mixed; boundary=m\r\n\
\r\n\
--m\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=first.bin\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
Zmlyc3Q=\r\n\
--m\r\n\
Content-Type: multipart/related; boundary=r\r\n\
\r\n\
--r\r\n\
Content-Type: text/html\r\n\
\r\n\
<img src=\"cid:one@host\"><img src=\"cid:two@host\">\r\n\
--r\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-Id: <one@host>\r\n\
\r\n\
b25l\r\n\
--r\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-Id: <two@host>\r\n\
\r\n\
dHdv\r\n\
--r--\r\n\
--m\r\n\
Content-Type: application/octet-stream\r\n\
Content-Disposition: attachment; filename=second.bin\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
c2Vjb25k\r\n\
--m\r\n\
Content-Type: image/gif\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-Id: <three@host>\r\n\
\r\n\
dGhyZWU=\r\n\
--m--\r\n";
    let msg = decode(raw).unwrap();
    assert_eq!(
        msg.html_body,
        "<img src=\"cid:one@host\"><img src=\"cid:two@host\">"
    );

    let names: Vec<_> = msg.attachments.iter().map(|a| a.filename.as_str()).collect();
    assert_eq!(names, ["first.bin", "second.bin"]);
    assert_eq!(msg.attachments[1].data, b"second");

    let cids: Vec<_> = msg.embedded_files.iter().map(|e| e.cid.as_str()).collect();
    assert_eq!(cids, ["one@host", "two@host", "three@host"]);
    let data: Vec<_> = msg.embedded_files.iter().map(|e| e.data.as_slice()).collect();
    assert_eq!(data, [&b"one"[..], &b"two"[..], &b"three"[..]]);
}

#[test]
fn test_unknown_part_type_names_parent_kind() {
    let raw = b"Content-Type: multipart/mixed; boundary=m\r\n\
\r\n\
--m\r\n\
Content-Type: application/x-mystery\r\n\
\r\n\
???\r\n\
--m--\r\n";
    let err = decode(raw).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Can't process multipart/mixed inner mime type: application/x-mystery"
    );
}

#[test]
fn test_nesting_limit() {
    let ok = decode(nested_message(16).as_bytes()).unwrap();
    assert_eq!(ok.text_body, "deep");

    let err = decode(nested_message(17).as_bytes()).unwrap_err();
    assert!(matches!(err, DecodeError::NestingTooDeep { limit: 16 }));

    let tight = DecoderConfig {
        max_depth: 2,
        ..DecoderConfig::default()
    };
    assert!(decode_with(nested_message(2).as_bytes(), &tight).is_ok());
    assert!(decode_with(nested_message(3).as_bytes(), &tight).is_err());
}

#[test]
fn test_missing_close_delimiter() {
    let raw = b"Content-Type: multipart/mixed; boundary=m\r\n\r\n--m\r\n\r\ntruncated";
    assert!(matches!(decode(raw), Err(DecodeError::MultipartSyntax(_))));
}

// ─── Header fields ──────────────────────────────────────────────────

#[test]
fn test_obsolete_dates_parse() {
    let named = decode(b"Date: Fri, 21 Nov 1997 09:55:06 PST\r\n\r\nx").unwrap();
    assert_eq!(named.date.unwrap().offset().local_minus_utc(), -8 * 3600);

    let commented = decode(b"Date: Fri, 21 Nov 1997 09:55:06 -0600 (MDT)\r\n\r\nx").unwrap();
    assert_eq!(commented.date.unwrap().offset().local_minus_utc(), -6 * 3600);

    let err = decode(b"Date: the day after tomorrow\r\n\r\nx").unwrap_err();
    assert_eq!(header_field(err), "Date");
}

#[test]
fn test_wrong_weekday_is_tolerated() {
    let msg = decode(b"Date: Mon, 04 Jan 2024 10:00:00 +0000\r\n\r\nx").unwrap();
    assert_eq!(msg.date.unwrap().to_rfc3339(), "2024-01-04T10:00:00+00:00");
}

#[test]
fn test_subject_encoded_word_after_literal() {
    let msg = decode(b"Subject: Re: =?UTF-8?B?SG9sYQ==?= there\r\n\r\nx\r\n").unwrap();
    assert_eq!(msg.subject, "Re:Hola there");
}

#[test]
fn test_from_validation() {
    assert_eq!(header_field(decode_fixture_err("bad_from.eml")), "From");

    let empty = decode(b"From:\r\nSubject: anonymous\r\n\r\nx").unwrap();
    assert!(empty.from.is_empty());
    assert_eq!(empty.subject, "anonymous");
}

fn decode_fixture_err(name: &str) -> DecodeError {
    decode_file(fixture(name), &DecoderConfig::default()).unwrap_err()
}

#[test]
fn test_first_error_in_processing_order_wins() {
    let raw = b"Date: not a date\r\nFrom: also not valid\r\n\r\nx";
    assert_eq!(header_field(decode(raw).unwrap_err()), "From");

    let raw = b"Content-Transfer-Encoding: bogus\r\nTo: <broken\r\n\r\nx";
    assert_eq!(header_field(decode(raw).unwrap_err()), "To");
}

#[test]
fn test_resent_fields() {
    let raw = b"From: a@example.com\r\n\
Resent-From: Relay <relay@example.com>\r\n\
Resent-To: x@example.com, y@example.com\r\n\
Resent-Date: Sat, 1 Jun 2024 12:00:00 +0000\r\n\
Resent-Message-ID: <resent-1@example.com>\r\n\
\r\n\
body";
    let msg = decode(raw).unwrap();
    assert_eq!(msg.resent_from[0].mailbox, "relay@example.com");
    assert_eq!(msg.resent_to.len(), 2);
    assert_eq!(msg.resent_message_id, "resent-1@example.com");
    assert!(msg.resent_date.is_some());
}

#[test]
fn test_headers_are_word_decoded() {
    let raw = b"Subject: =?UTF-8?B?w6l0w6k=?=\r\nX-Note: =?iso-8859-1?Q?gr=FC=DFe?=\r\n\r\n";
    let msg = decode(raw).unwrap();
    assert_eq!(msg.headers.get("subject"), Some("été"));
    assert_eq!(msg.headers.get("x-note"), Some("grüße"));
}

#[test]
fn test_garbage_header_block_is_malformed() {
    let raw = b"this is not a header\r\nSubject: x\r\n\r\nbody";
    assert!(matches!(decode(raw), Err(DecodeError::MalformedMessage(_))));
}

// ─── Delivery boundary ──────────────────────────────────────────────

#[test]
fn test_accept_data_rejects_with_554() {
    let raw = std::fs::read(fixture("bad_from.eml")).unwrap();
    let mut delivered = 0;
    let mut handler = |_: Message| -> anyhow::Result<()> {
        delivered += 1;
        Ok(())
    };
    let rejection = accept_data(&raw, &DecoderConfig::default(), &mut handler).unwrap_err();
    assert_eq!(rejection.code, 554);
    assert_eq!(rejection.enhanced_code, "5.6.0");
    assert_eq!(delivered, 0);
}

#[test]
fn test_accept_data_delivers_newsletter() {
    let raw = std::fs::read(fixture("newsletter.eml")).unwrap();
    let mut subjects = Vec::new();
    let mut handler = |m: Message| -> anyhow::Result<()> {
        subjects.push(m.subject);
        Ok(())
    };
    accept_data(&raw, &DecoderConfig::default(), &mut handler).unwrap();
    assert_eq!(subjects, ["Café news for May"]);
}

// ─── Export ─────────────────────────────────────────────────────────

#[test]
fn test_export_newsletter_files() {
    let temp = assert_fs::TempDir::new().unwrap();
    let msg = decode_fixture("newsletter.eml");

    let paths = export_attachments(&msg, temp.path(), true).unwrap();
    assert_eq!(paths.len(), 2);

    temp.child("menu.pdf").assert(predicate::path::is_file());
    temp.child("logo.png").assert(predicate::path::is_file());
    temp.child("menu.pdf")
        .assert(predicate::path::is_file().and(predicate::function(|p: &Path| {
            std::fs::read(p).is_ok_and(|data| data.starts_with(b"%PDF"))
        })));

    let again = export_attachments(&msg, temp.path(), false).unwrap();
    assert_eq!(again, [temp.path().join("menu_1.pdf")]);

    temp.close().unwrap();
}
