//! Email templates and the HTTP mail API sender.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use astranote::config::EmailConfig;
use astranote::delivery::email::{
    build_payload, otp_email, reminder_email, EmailError, EmailSender, HttpEmailSender,
};

/// Serve one response and hand back the raw request text.
async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => panic!("listener should bind: {err}"),
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("listener should expose local addr: {err}"),
    };

    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut raw = Vec::new();
        let mut chunk = [0_u8; 4096];
        while let Ok(read) = socket.read(&mut chunk).await {
            if read == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&raw).into_owned();
            if let Some((head, rest)) = text.split_once("\r\n\r\n") {
                let expected = head
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if rest.len() >= expected {
                    break;
                }
            }
        }
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = tx.send(String::from_utf8_lossy(&raw).into_owned());
    });

    (format!("http://{addr}/emails"), rx)
}

#[test]
fn otp_email_carries_code_and_lifetime() {
    let email = otp_email("a@example.com", "123456", 10);
    assert_eq!(email.to, "a@example.com");
    assert!(email.subject.contains("verification code"));
    assert!(email.html.contains("123456"));
    assert!(email.html.contains("10 minutes"));
}

#[test]
fn reminder_email_escapes_the_message() {
    let email = reminder_email("a@example.com", "<script>alert(1)</script> & chai");
    assert!(!email.html.contains("<script>"));
    assert!(email.html.contains("&lt;script&gt;"));
    assert!(email.html.contains("&amp; chai"));
}

#[test]
fn payload_wraps_the_recipient_in_a_list() {
    let email = reminder_email("a@example.com", "chai");
    let wire = serde_json::to_value(build_payload("AstraNote <r@astranote.app>", &email))
        .expect("should serialize");
    assert_eq!(wire["from"], "AstraNote <r@astranote.app>");
    assert_eq!(wire["to"], serde_json::json!(["a@example.com"]));
    assert_eq!(wire["subject"], email.subject.as_str());
    assert_eq!(wire["html"], email.html.as_str());
}

#[test]
fn sender_needs_an_api_key() {
    assert!(HttpEmailSender::from_config(&EmailConfig::default()).is_none());

    let blank = EmailConfig {
        api_key: Some("  ".to_owned()),
        ..EmailConfig::default()
    };
    assert!(HttpEmailSender::from_config(&blank).is_none());

    let configured = EmailConfig {
        api_key: Some("re_test_key".to_owned()),
        ..EmailConfig::default()
    };
    let sender = HttpEmailSender::from_config(&configured).expect("configured");
    assert!(!format!("{sender:?}").contains("re_test_key"));
}

#[tokio::test]
async fn sender_posts_json_with_bearer_auth() {
    let (url, seen) = serve_once("200 OK", r#"{"id":"email_1"}"#).await;
    let sender = HttpEmailSender::new(url, "re_test_key".to_owned(), "r@astranote.app".to_owned());

    sender
        .send(&otp_email("a@example.com", "654321", 10))
        .await
        .expect("send should succeed");

    let request = seen.await.expect("request captured");
    assert!(request.starts_with("POST /emails"));
    assert!(request
        .lines()
        .any(|l| l.eq_ignore_ascii_case("authorization: Bearer re_test_key")));
    assert!(request.contains("\"to\":[\"a@example.com\"]"));
    assert!(request.contains("654321"));
}

#[tokio::test]
async fn rejected_send_is_an_error_with_clean_body() {
    let (url, _seen) = serve_once(
        "401 Unauthorized",
        r#"{"message":"API key re_ABCDEFGHIJKLMNOPQRSTUVWX is invalid"}"#,
    )
    .await;
    let sender = HttpEmailSender::new(url, "re_bad".to_owned(), "r@astranote.app".to_owned());

    match sender.send(&reminder_email("a@example.com", "chai")).await {
        Err(EmailError::HttpStatus { status, body }) => {
            assert_eq!(status, 401);
            assert!(body.contains("[REDACTED]"));
            assert!(!body.contains("re_ABCDEFGHIJKLMNOPQRSTUVWX"));
        }
        other => panic!("expected http status error, got {other:?}"),
    }
}
