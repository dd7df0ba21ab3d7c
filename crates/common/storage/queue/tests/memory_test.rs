// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Queue behavior on the in-memory filesystem, in both profiles.

use flatq_common_telemetry::logging::init_default_ut_logging;
use flatq_queue::{
    DequeueOrder, ErrorKind, FileSystem, MemoryFileSystem, Queue, QueueBuilder,
};
use test_case::test_case;

const MAGIC: u32 = 0x5EED_0001;

fn open(fs: &MemoryFileSystem, magic: u32, order: DequeueOrder) -> Queue<MemoryFileSystem> {
    init_default_ut_logging();
    QueueBuilder::new(fs.clone())
        .magic(magic)
        .order(order)
        .open("/mq")
        .unwrap()
}

#[test_case(MemoryFileSystem::new() ; "hierarchical")]
#[test_case(MemoryFileSystem::flat() ; "flat")]
fn test_fifo_across_restart(fs: MemoryFileSystem) {
    {
        let mut queue = open(&fs, MAGIC, DequeueOrder::Oldest);
        for i in 0..5u8 {
            queue.enqueue(0, &[i]).unwrap();
        }
    }

    let mut queue = open(&fs, MAGIC, DequeueOrder::Oldest);
    assert_eq!(queue.next_sequence(), 6);
    for i in 0..5u8 {
        let message = queue.dequeue(false).unwrap();
        assert_eq!(message.sequence, u32::from(i) + 1);
        assert_eq!(&message.payload[..], &[i]);
    }
    assert_eq!(queue.dequeue(false).unwrap_err().kind(), ErrorKind::QueueEmpty);
}

#[test_case(MemoryFileSystem::new() ; "hierarchical")]
#[test_case(MemoryFileSystem::flat() ; "flat")]
fn test_shared_prefix_isolation(fs: MemoryFileSystem) {
    let mut fifo = open(&fs, MAGIC, DequeueOrder::Oldest);
    let mut lifo = open(&fs, MAGIC + 1, DequeueOrder::Latest);

    for sequence in [10, 20, 30] {
        fifo.enqueue(sequence, b"fifo").unwrap();
        lifo.enqueue(sequence, b"lifo").unwrap();
    }
    // Same sequence numbers: each queue's entries took distinct sub-indexes.
    assert_eq!(fs.file_names("/mq").len(), 6);

    assert_eq!(fifo.dequeue(false).unwrap().sequence, 10);
    assert_eq!(lifo.dequeue(false).unwrap().sequence, 30);

    assert_eq!(fifo.purge(false).unwrap(), 2);
    assert!(fifo.is_empty(false).unwrap());
    assert!(!lifo.is_empty(false).unwrap());

    let payloads: Vec<_> = (0..2).map(|_| lifo.dequeue(false).unwrap()).collect();
    assert_eq!(
        payloads.iter().map(|m| m.sequence).collect::<Vec<_>>(),
        vec![20, 10]
    );
    assert!(payloads.iter().all(|m| &m.payload[..] == b"lifo"));
}

#[test]
fn test_flat_prefix_length_limit() {
    init_default_ut_logging();
    let fs = MemoryFileSystem::flat();
    assert!(fs.max_path_len() < 40);

    let err = QueueBuilder::new(fs.clone())
        .open("/this/prefix/is/too/long")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidPrefix);

    // The same prefix is fine on a hierarchical filesystem.
    assert!(
        QueueBuilder::new(MemoryFileSystem::new())
            .open("/this/prefix/is/too/long")
            .is_ok()
    );
}

#[test]
fn test_poisoned_head_can_be_skipped_by_caller() {
    let fs = MemoryFileSystem::new();
    let mut queue = open(&fs, MAGIC, DequeueOrder::Oldest);
    queue.enqueue(1, b"good-1").unwrap();
    queue.enqueue(2, b"good-2").unwrap();

    let mut data = fs.read_file("/mq/0000000001-00").unwrap();
    data[5] ^= 0xFF;
    fs.write_file("/mq/0000000001-00", data);

    let err = queue.dequeue(false).unwrap_err();
    assert!(err.is_poisoned_entry());

    // Quarantine policy belongs to the caller: drop the bad entry and go on.
    fs.remove("/mq/0000000001-00").unwrap();
    assert_eq!(&queue.dequeue(false).unwrap().payload[..], b"good-2");
}
