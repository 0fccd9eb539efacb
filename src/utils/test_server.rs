/// 测试用的一次性本地 HTTP 服务
///
/// 代替 Token 端点和 Gmail API，记录收到的请求
use std::io::Read;
use std::thread::JoinHandle;
use std::time::Duration;
use tiny_http::{Header, Response, Server};

/// 收到的请求
#[derive(Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub struct MockServer {
    pub base_url: String,
    handle: JoinHandle<Option<CapturedRequest>>,
}

impl MockServer {
    /// 等待服务线程结束并返回捕获的请求
    pub fn captured(self) -> CapturedRequest {
        self.handle
            .join()
            .expect("mock server thread panicked")
            .expect("mock server received no request")
    }
}

/// 启动只响应一次请求的服务
pub fn serve_once(status: u16, content_type: &str, body: &str) -> MockServer {
    let server = Server::http("127.0.0.1:0").expect("bind mock server");
    let port = server.server_addr().to_ip().expect("ip listener").port();
    let content_type = content_type.to_string();
    let body = body.to_string();

    let handle = std::thread::spawn(move || {
        let mut request = server.recv_timeout(Duration::from_secs(10)).ok()??;

        let mut request_body = String::new();
        request.as_reader().read_to_string(&mut request_body).ok()?;

        let captured = CapturedRequest {
            method: request.method().to_string(),
            url: request.url().to_string(),
            headers: request
                .headers()
                .iter()
                .map(|h| (h.field.to_string(), h.value.to_string()))
                .collect(),
            body: request_body,
        };

        let header = Header::from_bytes(b"Content-Type", content_type.as_bytes()).ok()?;
        let response = Response::from_data(body.into_bytes())
            .with_status_code(status)
            .with_header(header);
        request.respond(response).ok()?;

        Some(captured)
    });

    MockServer {
        base_url: format!("http://127.0.0.1:{}", port),
        handle,
    }
}
