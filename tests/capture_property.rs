// tests/capture_property.rs

use std::io;
use std::sync::Arc;

use proptest::prelude::*;
use tokio::sync::oneshot;

use taskpipe::output::{DecoratedOutputWriter, OutputConfig, SharedWriter, TaskOutput};
use taskpipe::scheduler::Stage;
use taskpipe_test_utils::recording::RecordingDecorator;
use taskpipe_test_utils::scripted::ScriptedReader;

// Stdout uses lowercase letters, stderr digits, so each channel can be
// recovered from an interleaved capture.
fn channel_chunks(alphabet: &'static [u8]) -> impl Strategy<Value = Vec<Vec<u8>>> {
    proptest::collection::vec(
        proptest::collection::vec(proptest::sample::select(alphabet), 0..40),
        0..12,
    )
}

fn reader(chunks: &[Vec<u8>]) -> ScriptedReader {
    chunks
        .iter()
        .fold(ScriptedReader::new(), |r, chunk| r.chunk(chunk))
}

fn keep(bytes: &[u8], alphabet: &[u8]) -> Vec<u8> {
    bytes.iter().copied().filter(|b| alphabet.contains(b)).collect()
}

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn capture_holds_every_byte_once_in_channel_order(
        out_chunks in channel_chunks(LETTERS),
        err_chunks in channel_chunks(DIGITS),
        chunk_size in 1usize..64,
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let expected_out: Vec<u8> = out_chunks.concat();
        let expected_err: Vec<u8> = err_chunks.concat();

        let recorder = RecordingDecorator::new();
        let (captured, stage) = rt.block_on({
            let recorder = Arc::clone(&recorder);
            let stdout = reader(&out_chunks);
            let stderr = reader(&err_chunks);
            async move {
                let output = TaskOutput::with_decorator(
                    &OutputConfig::to_writer(SharedWriter::new(io::sink()))
                        .with_chunk_size(chunk_size),
                    move |_, _| recorder as Arc<dyn DecoratedOutputWriter>,
                );
                let stage = Stage::new("prop", "true");
                let (tx, rx) = oneshot::channel();
                output.stream(&stage, stdout, stderr, tx).await;
                (rx.await.unwrap(), stage)
            }
        });

        prop_assert_eq!(captured.len(), expected_out.len() + expected_err.len());
        prop_assert_eq!(keep(&captured, LETTERS), expected_out.clone());
        prop_assert_eq!(keep(&captured, DIGITS), expected_err.clone());

        // The decorator observed exactly the captured interleaving.
        prop_assert_eq!(recorder.written_by("prop"), captured);

        prop_assert_eq!(stage.log.stdout.contents(), expected_out);
        prop_assert_eq!(stage.log.stderr.contents(), expected_err);
    }
}
