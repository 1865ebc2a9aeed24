use std::io;
use std::net::SocketAddr;

use spark_command_core::TransportError;
use thiserror::Error;

/// 描述一次底层操作对应的稳定错误码与默认文案。
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperationKind {
    pub code: &'static str,
    pub message: &'static str,
}

pub(crate) const BIND: OperationKind = OperationKind {
    code: "spark.transport.tcp.bind_failed",
    message: "tcp bind",
};
pub(crate) const CONNECT: OperationKind = OperationKind {
    code: "spark.transport.tcp.connect_failed",
    message: "tcp connect",
};
pub(crate) const CONFIGURE: OperationKind = OperationKind {
    code: "spark.transport.tcp.configure_failed",
    message: "tcp configure",
};
pub(crate) const WRITE: OperationKind = OperationKind {
    code: "spark.transport.tcp.write_failed",
    message: "tcp write",
};
pub(crate) const READ: OperationKind = OperationKind {
    code: "spark.transport.tcp.read_failed",
    message: "tcp read",
};

/// 将 IO 错误映射为传输错误。
///
/// - 建连阶段的失败统一归为 [`TransportError::Connect`]，连接器据此判定对端不可达；
/// - 其余阶段归为 [`TransportError::Io`]；超时由调用方的计时器单独报告。
pub(crate) fn map_io_error(kind: OperationKind, endpoint: &str, error: io::Error) -> TransportError {
    tracing::trace!(code = kind.code, endpoint, error = %error, "{} failed", kind.message);
    if kind.code == CONNECT.code {
        return TransportError::Connect {
            endpoint: endpoint.to_owned(),
            source: error,
        };
    }
    TransportError::Io {
        endpoint: endpoint.to_owned(),
        source: error,
    }
}

/// 服务端启动失败。
#[derive(Debug, Error)]
pub enum ServeError {
    /// 监听地址绑定失败。
    #[error("tcp bind: cannot bind `{addr}`: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl ServeError {
    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ServeError::Bind { .. } => BIND.code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_phase_failures_are_connect_errors() {
        let err = map_io_error(
            CONNECT,
            "127.0.0.1:1",
            io::Error::from(io::ErrorKind::ConnectionRefused),
        );
        assert!(matches!(err, TransportError::Connect { .. }));

        let err = map_io_error(READ, "127.0.0.1:1", io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(err, TransportError::Io { .. }));
        assert_eq!(err.endpoint(), "127.0.0.1:1");
    }
}
