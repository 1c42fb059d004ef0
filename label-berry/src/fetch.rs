//! 远程归档下载与解压.
//!
//! 每个病例对应远程的一个 zip 归档, 位于 `<base_url>/<case>/<archive_name>`.
//! 下载后解压到 `<target>/<case>/`, 随后删除归档.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::consts::DEFAULT_ARCHIVE_NAME;
use crate::error::{ArchiveError, FetchError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const BUF_SIZE: usize = 64 * 1024;

/// 逐病例下载远程归档.
pub struct Fetcher {
    base_url: String,
    target_dir: PathBuf,
    archive_name: String,
    agent: ureq::Agent,
}

/// 批量下载的结果.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// 成功解压的病例目录.
    pub fetched: Vec<PathBuf>,

    /// 失败的病例及原因.
    pub failed: Vec<(String, FetchError)>,
}

impl FetchReport {
    /// 是否全部成功?
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Fetcher {
    /// 创建下载器. 归档名默认为 [`DEFAULT_ARCHIVE_NAME`].
    pub fn new(base_url: impl Into<String>, target_dir: impl Into<PathBuf>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .build();
        Self {
            base_url: base_url.into(),
            target_dir: target_dir.into(),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            agent,
        }
    }

    /// 修改远程归档名.
    pub fn archive_name(mut self, name: impl Into<String>) -> Self {
        self.archive_name = name.into();
        self
    }

    /// 下载目标根目录.
    #[inline]
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// 病例 `case` 的归档地址. 各段之间的多余 `/` 会被合并.
    pub fn url_for(&self, case: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            case.trim_matches('/'),
            self.archive_name.trim_start_matches('/'),
        )
    }

    /// 下载并解压单个病例, 返回解压后的病例目录.
    ///
    /// 失败时不会留下归档文件; 已部分解压的内容保留在病例目录中.
    pub fn fetch_case(&self, case: &str) -> Result<PathBuf, FetchError> {
        let url = self.url_for(case);
        let case_name = case.trim_matches('/');
        let zip_path = self.target_dir.join(format!("{case_name}.zip"));
        let case_dir = self.target_dir.join(case_name);

        log::info!("Downloading {url}");
        let downloaded = self
            .download(&url, &zip_path)
            .and_then(|_| unpack(&zip_path, &case_dir).map_err(FetchError::from));
        // 归档只是中间产物, 无论成败都删除.
        if let Err(e) = fs::remove_file(&zip_path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("cannot remove {}: {e}", zip_path.display());
            }
        }
        downloaded?;

        log::info!("Extracted {case_name} into {}", case_dir.display());
        Ok(case_dir)
    }

    /// 依次下载多个病例. 单个病例失败只记录, 不影响其余病例.
    pub fn fetch_all<I, S>(&self, cases: I) -> FetchReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut report = FetchReport::default();
        for case in cases {
            let case = case.as_ref();
            match self.fetch_case(case) {
                Ok(dir) => report.fetched.push(dir),
                Err(e) => {
                    log::error!("Failed to fetch {case}: {e}");
                    report.failed.push((case.to_string(), e));
                }
            }
        }
        report
    }

    /// 将 `url` 的响应体写入 `dest`, 并与 `Content-Length` 核对.
    fn download(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let response = match self.agent.get(url).call() {
            Ok(r) => r,
            Err(ureq::Error::Status(status, _)) => {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                })
            }
            Err(e) => {
                return Err(FetchError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                })
            }
        };
        let expected = response
            .header("Content-Length")
            .and_then(|s| s.trim().parse::<u64>().ok());

        let io_err = |source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut out = BufWriter::new(File::create(dest).map_err(io_err)?);

        let mut reader = response.into_reader();
        let mut buf = vec![0u8; BUF_SIZE];
        let mut got = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // 连接在声明的长度之前关闭.
                    if let Some(expected) = expected.filter(|&n| got < n) {
                        return Err(FetchError::Truncated {
                            url: url.to_string(),
                            expected,
                            got,
                        });
                    }
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
            };
            out.write_all(&buf[..n]).map_err(io_err)?;
            got += n as u64;
        }
        out.flush().map_err(io_err)?;

        match expected {
            Some(expected) if expected != got => Err(FetchError::Truncated {
                url: url.to_string(),
                expected,
                got,
            }),
            _ => Ok(got),
        }
    }
}

/// 将 zip 归档 `archive` 解压到目录 `dest`.
pub fn unpack(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let zip_err = |source| ArchiveError::Zip {
        path: archive.to_path_buf(),
        source,
    };
    let file = File::open(archive).map_err(|source| ArchiveError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    fs::create_dir_all(dest).map_err(|source| ArchiveError::Io {
        path: dest.to_path_buf(),
        source,
    })?;
    let mut zip = zip::ZipArchive::new(file).map_err(zip_err)?;
    zip.extract(dest).map_err(zip_err)
}
