use super::runner::{run_checked, CommandRunner};
use crate::application::splice::SpliceBackend;
use crate::domain::job::SpliceRange;
use async_trait::async_trait;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn Error + Send + Sync>;

/// Cuts ranges out of a local source with stream copy and joins them with
/// the concat demuxer.
pub struct FfmpegSplicer<R: ?Sized> {
    pub runner: Arc<R>,
    pub binary: String,
    pub source: String,
    pub dir: PathBuf,
    pub extension: String,
    pub cancel: CancellationToken,
}

impl<R: ?Sized> FfmpegSplicer<R> {
    fn part_path(&self, position: usize) -> PathBuf {
        self.dir.join(format!("part_{:03}.{}", position, self.extension))
    }

    pub fn output_path(&self) -> PathBuf {
        self.dir.join(format!("spliced.{}", self.extension))
    }
}

#[async_trait]
impl<R> SpliceBackend for FfmpegSplicer<R>
where
    R: CommandRunner + ?Sized + 'static,
{
    async fn trim(&self, position: usize, range: SpliceRange) -> Result<String, BoxError> {
        let part = self.part_path(position);
        let args = vec![
            "-y".to_string(),
            "-ss".to_string(),
            range.start.to_string(),
            "-i".to_string(),
            self.source.clone(),
            "-t".to_string(),
            range.duration().to_string(),
            "-c".to_string(),
            "copy".to_string(),
            "-avoid_negative_ts".to_string(),
            "make_zero".to_string(),
            part.to_string_lossy().into_owned(),
        ];
        run_checked(self.runner.as_ref(), &self.binary, args, self.cancel.clone()).await?;
        Ok(part.to_string_lossy().into_owned())
    }

    async fn concat(&self, parts: Vec<String>) -> Result<String, BoxError> {
        let list = self.dir.join("concat.txt");
        let body: String = parts
            .iter()
            .map(|p| format!("file '{}'\n", p.replace('\'', "'\\''")))
            .collect();
        tokio::fs::write(&list, body).await?;

        let output = self.output_path();
        let args = vec![
            "-y".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            list.to_string_lossy().into_owned(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().into_owned(),
        ];
        run_checked(self.runner.as_ref(), &self.binary, args, self.cancel.clone()).await?;
        Ok(output.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ffmpeg::runner::{CommandOutput, MockCommandRunner};
    use crate::application::splice::splice;

    fn splicer(runner: MockCommandRunner, dir: PathBuf) -> Arc<FfmpegSplicer<MockCommandRunner>> {
        Arc::new(FfmpegSplicer {
            runner: Arc::new(runner),
            binary: "ffmpeg".to_string(),
            source: "/media/in.mp4".to_string(),
            dir,
            extension: "mp4".to_string(),
            cancel: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn test_trim_and_concat() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, args, _| {
                program == "ffmpeg" && args.iter().any(|a| a == "-ss" || a == "concat")
            })
            .times(3)
            .returning(|_, _, _| {
                Ok(CommandOutput {
                    success: true,
                    ..CommandOutput::default()
                })
            });

        let backend = splicer(runner, dir.path().to_path_buf());
        let ranges = [
            SpliceRange { start: 0.0, end: 5.0 },
            SpliceRange { start: 30.0, end: 32.5 },
        ];
        let result = splice(backend.clone(), &ranges).await.unwrap();
        assert_eq!(result, backend.output_path().to_string_lossy());

        let list = std::fs::read_to_string(dir.path().join("concat.txt")).unwrap();
        let expected = format!(
            "file '{}'\nfile '{}'\n",
            dir.path().join("part_000.mp4").display(),
            dir.path().join("part_001.mp4").display()
        );
        assert_eq!(list, expected);
    }

    #[tokio::test]
    async fn test_failed_trim() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|_, _, _| {
            Ok(CommandOutput {
                success: false,
                stderr: "Invalid data found when processing input".to_string(),
                ..CommandOutput::default()
            })
        });

        let backend = splicer(runner, dir.path().to_path_buf());
        let err = backend
            .trim(0, SpliceRange { start: 1.0, end: 2.0 })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid data"));
    }
}
